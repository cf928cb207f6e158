//! Core data structures shared by the format, index and volume layers.
//!
//! This module defines the fundamental types used throughout the library:
//! - Format and codec enumerations
//! - Index entries and article pointers
//! - Articles, tags and the handles used to fetch them lazily

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{DictError, Result};

/// On-disk layout of a volume, selected by the version token in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    /// Legacy format: variable-size records chained by forward offsets.
    Linked,
    /// Fixed-stride `(word_ptr, global article pointer)` records.
    Positional,
    /// Fixed-stride `(word_ptr, file_no, local article pointer)` records.
    FixedRecord,
}

impl FormatVersion {
    pub const fn token(&self) -> &'static [u8; 4] {
        match self {
            FormatVersion::Linked => b"LNK1",
            FormatVersion::Positional => b"POS1",
            FormatVersion::FixedRecord => b"FIX1",
        }
    }

    /// Returns true for the formats whose long index supports random access.
    pub fn is_array(&self) -> bool {
        !matches!(self, FormatVersion::Linked)
    }
}

impl TryFrom<&[u8]> for FormatVersion {
    type Error = DictError;
    fn try_from(token: &[u8]) -> Result<Self> {
        match token {
            b"LNK1" => Ok(Self::Linked),
            b"POS1" => Ok(Self::Positional),
            b"FIX1" => Ok(Self::FixedRecord),
            _ => Err(DictError::Format(format!(
                "Unsupported version token: {:?}",
                String::from_utf8_lossy(token)
            ))),
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            FormatVersion::Linked => "linked",
            FormatVersion::Positional => "positional",
            FormatVersion::FixedRecord => "fixed-record",
        })
    }
}

/// Article compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    None,
    Zlib,
    Lzo,
}

impl Codec {
    pub const ALL: [Codec; 3] = [Codec::None, Codec::Zlib, Codec::Lzo];

    pub fn name(&self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Zlib => "zlib",
            Codec::Lzo => "lzo",
        }
    }
}

impl TryFrom<&str> for Codec {
    type Error = DictError;
    fn try_from(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "zlib" | "deflate" => Ok(Self::Zlib),
            "lzo" => Ok(Self::Lzo),
            other => Err(DictError::InvalidFormat(format!("Unknown codec: {}", other))),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Location of an article record.
///
/// Linked and positional volumes store a single pointer into the volume-wide
/// article space; fixed-record volumes name the file explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArticlePointer {
    Global(u64),
    Local { file_no: u32, offset: u64 },
}

impl fmt::Display for ArticlePointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArticlePointer::Global(p) => write!(f, "@{}", p),
            ArticlePointer::Local { file_no, offset } => write!(f, "{}@{}", file_no, offset),
        }
    }
}

/// A single record from the long index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub word: String,
    /// Byte offset inside the linked region, or record number for array formats.
    pub position: u64,
    /// Position of the following record, `None` for the last one.
    pub next: Option<u64>,
    pub article: ArticlePointer,
}

/// Identity of an opened volume: `(title, version, file_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId {
    pub title: String,
    pub version: String,
    pub file_name: String,
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} ({})", self.title, self.version, self.file_name)
    }
}

/// Everything needed to fetch an article later, without holding the volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArticleHandle {
    pub pointer: ArticlePointer,
    pub title: String,
    pub volume: VolumeId,
}

/// A tag attribute value. Attributes are either strings or numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// A markup span over the article text, `[start, end)` in characters.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub attributes: BTreeMap<String, AttrValue>,
}

/// A decoded article.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: String,
    pub text: String,
    pub tags: Vec<Tag>,
    /// Target title when this article only redirects elsewhere.
    pub redirect: Option<String>,
    /// Codec that produced the payload, `None` when the raw-bytes fallback was used.
    pub codec: Option<Codec>,
    pub volume: VolumeId,
}

impl Article {
    pub fn is_redirect(&self) -> bool {
        self.redirect.is_some()
    }

    /// Placeholder returned when a redirect target cannot be found.
    pub fn not_found(title: &str, volume: VolumeId) -> Self {
        Article {
            title: title.to_string(),
            text: String::new(),
            tags: Vec::new(),
            redirect: None,
            codec: None,
            volume,
        }
    }
}
