//! Volume file header parsing.
//!
//! # Header Structure
//! ```text
//! [8 bytes]  Signature b"LEXIVOL\0"
//! [4 bytes]  Version token (b"LNK1", b"POS1" or b"FIX1")
//! [8 bytes]  Metadata length, ASCII decimal, zero padded
//! [N bytes]  Metadata, a JSON object
//! ```
//!
//! The metadata is never trusted partially: a missing or non-numeric
//! required field rejects the whole file.

use std::io::{Read, Write};

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::dict::types::error::{DictError, Result};
use crate::dict::types::models::{Codec, FormatVersion};

pub const SIGNATURE: &[u8; 8] = b"LEXIVOL\0";
const LENGTH_DIGITS: usize = 8;
/// Bytes before the metadata block.
pub const PREAMBLE_LEN: u64 = (SIGNATURE.len() + 4 + LENGTH_DIGITS) as u64;

fn one() -> u64 {
    1
}

/// Named fields of the metadata block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub version: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Encoding of word bytes; UTF-8 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Preferred article codec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    pub timestamp: u64,
    #[serde(default = "one")]
    pub file_count: u64,
    #[serde(default)]
    pub file_no: u64,
    #[serde(default)]
    pub article_base: u64,
    pub article_offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words_offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_index_offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_index_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_index_depth: Option<u64>,
}

impl Metadata {
    /// Preferred codec, ignoring names this build does not know.
    pub fn codec_hint(&self) -> Option<Codec> {
        self.compression
            .as_deref()
            .and_then(|name| Codec::try_from(name).ok())
    }
}

/// Location of the eagerly stored prefix table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortTableLayout {
    pub offset: u64,
    pub count: u64,
    pub depth: usize,
}

impl ShortTableLayout {
    /// Bytes per entry: `depth` code points and a `u64` position.
    pub fn entry_len(&self) -> Option<u64> {
        (self.depth as u64).checked_mul(4)?.checked_add(8)
    }

    /// Total bytes of the table, `None` on overflow.
    pub fn byte_len(&self) -> Option<u64> {
        self.count.checked_mul(self.entry_len()?)
    }
}

/// Index region layout of a primary file, validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLayout {
    pub index_offset: u64,
    pub index_count: u64,
    /// Start of the word strings region (array formats only).
    pub words_offset: Option<u64>,
    pub short_table: Option<ShortTableLayout>,
}

/// A parsed file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub format: FormatVersion,
    pub metadata: Metadata,
    /// Total header size including the metadata block.
    pub len: u64,
}

impl FileHeader {
    /// Validates the fields only a primary file carries.
    pub fn index_layout(&self) -> Result<IndexLayout> {
        let meta = &self.metadata;
        let required = |value: Option<u64>, name: &str| {
            value.ok_or_else(|| DictError::Format(format!("Missing required field '{}'", name)))
        };

        if meta.file_no != 0 {
            return Err(DictError::Format(format!(
                "Primary file has file_no {}",
                meta.file_no
            )));
        }
        if meta.file_count == 0 {
            return Err(DictError::Format("file_count must be at least 1".to_string()));
        }

        let index_offset = required(meta.index_offset, "index_offset")?;
        let index_count = required(meta.index_count, "index_count")?;
        if index_offset < self.len || index_offset > meta.article_offset {
            return Err(DictError::Format(format!(
                "index_offset {} outside [{}, {}]",
                index_offset, self.len, meta.article_offset
            )));
        }

        let words_offset = if self.format.is_array() {
            let words = required(meta.words_offset, "words_offset")?;
            if words < index_offset || words > meta.article_offset {
                return Err(DictError::Format(format!("words_offset {} out of range", words)));
            }
            Some(words)
        } else {
            None
        };

        let short_table = match (
            meta.short_index_offset,
            meta.short_index_count,
            meta.short_index_depth,
        ) {
            (None, None, None) => None,
            (Some(offset), Some(count), Some(depth)) if depth > 0 => {
                let table = ShortTableLayout {
                    offset,
                    count,
                    depth: usize::try_from(depth).map_err(|_| {
                        DictError::Format(format!("short_index_depth {} too large", depth))
                    })?,
                };
                let end = table.byte_len().and_then(|len| offset.checked_add(len));
                match end {
                    Some(end) if offset >= self.len && end <= index_offset => Some(table),
                    _ => {
                        return Err(DictError::Format(format!(
                            "short index table ({} entries of depth {} at {}) outside [{}, {}]",
                            count, depth, offset, self.len, index_offset
                        )));
                    }
                }
            }
            _ => {
                return Err(DictError::Format(
                    "short_index_offset, short_index_count and short_index_depth must appear together"
                        .to_string(),
                ));
            }
        };

        Ok(IndexLayout {
            index_offset,
            index_count,
            words_offset,
            short_table,
        })
    }
}

/// Parses the header from the beginning of a volume file.
pub fn parse<R: Read>(file: &mut R) -> Result<FileHeader> {
    let mut signature = [0u8; 8];
    read_preamble(file, &mut signature)?;
    if &signature != SIGNATURE {
        return Err(DictError::Format(format!(
            "Bad signature {:?}",
            String::from_utf8_lossy(&signature)
        )));
    }

    let mut token = [0u8; 4];
    read_preamble(file, &mut token)?;
    let format = FormatVersion::try_from(&token[..])?;
    debug!("Format token {:?} => {}", String::from_utf8_lossy(&token), format);

    let mut digits = [0u8; LENGTH_DIGITS];
    read_preamble(file, &mut digits)?;
    let meta_len = std::str::from_utf8(&digits)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            DictError::Format(format!(
                "Metadata length is not decimal: {:?}",
                String::from_utf8_lossy(&digits)
            ))
        })?;
    trace!("Metadata length: {} bytes", meta_len);

    let mut meta_bytes = Vec::new();
    file.by_ref().take(meta_len).read_to_end(&mut meta_bytes)?;
    if meta_bytes.len() as u64 != meta_len {
        return Err(DictError::Format(format!(
            "Metadata truncated: expected {} bytes, found {}",
            meta_len,
            meta_bytes.len()
        )));
    }

    let metadata: Metadata = serde_json::from_slice(&meta_bytes)
        .map_err(|e| DictError::Format(format!("Invalid metadata: {}", e)))?;

    let len = PREAMBLE_LEN + meta_len;
    if metadata.article_offset < len {
        return Err(DictError::Format(format!(
            "article_offset {} points inside the header ({} bytes)",
            metadata.article_offset, len
        )));
    }

    info!(
        "Header parsed: format={}, title='{}', version='{}', file {}/{}",
        format, metadata.title, metadata.version, metadata.file_no, metadata.file_count
    );

    Ok(FileHeader {
        format,
        metadata,
        len,
    })
}

/// A short file is a format problem, not an I/O one.
fn read_preamble<R: Read>(file: &mut R, buf: &mut [u8]) -> Result<()> {
    file.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => DictError::Format("File too short for header".to_string()),
        _ => DictError::Io(e),
    })
}

/// Serializes a complete header for `metadata`.
pub fn encode(format: FormatVersion, metadata: &Metadata) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(metadata)?;
    if json.len() >= 10usize.pow(LENGTH_DIGITS as u32) {
        return Err(DictError::InvalidFormat("Metadata block too large".to_string()));
    }
    let mut out = Vec::with_capacity(PREAMBLE_LEN as usize + json.len());
    out.write_all(SIGNATURE)?;
    out.write_all(format.token())?;
    write!(out, "{:0width$}", json.len(), width = LENGTH_DIGITS)?;
    out.write_all(&json)?;
    Ok(out)
}

/// Size of the header [`encode`] would produce.
pub fn encoded_len(metadata: &Metadata) -> Result<u64> {
    Ok(PREAMBLE_LEN + serde_json::to_vec(metadata)?.len() as u64)
}
