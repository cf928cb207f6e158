//! Article records across all files of a volume.
//!
//! Each record is a big-endian `u32` length followed by that many
//! compressed bytes. Every file contributes one article region; global
//! pointers are mapped onto files through their `article_base`.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use log::{trace, warn};

use crate::dict::codec::CodecChain;
use crate::dict::format::content::{self, Payload};
use crate::dict::types::error::{DictError, Result};
use crate::dict::types::models::{ArticlePointer, Codec};
use crate::dict::utils::SharedFile;

/// One file's article region.
#[derive(Debug, Clone)]
pub struct ArticleFile {
    pub file_no: u32,
    /// First global pointer served by this file.
    pub base: u64,
    /// Absolute offset of the region inside the file.
    pub region_start: u64,
    pub file: Arc<SharedFile>,
}

impl ArticleFile {
    pub fn region_len(&self) -> u64 {
        self.file.len().saturating_sub(self.region_start)
    }
}

#[derive(Debug)]
pub struct ArticleStore {
    /// Sorted by `base`.
    files: Vec<ArticleFile>,
    codecs: CodecChain,
}

impl ArticleStore {
    pub fn new(mut files: Vec<ArticleFile>, codecs: CodecChain) -> Self {
        files.sort_by_key(|f| (f.base, f.file_no));
        Self { files, codecs }
    }

    pub fn files(&self) -> &[ArticleFile] {
        &self.files
    }

    pub fn codecs(&self) -> &CodecChain {
        &self.codecs
    }

    /// Maps a pointer to its file and the region-relative offset.
    pub fn locate(&self, pointer: ArticlePointer) -> Result<(&ArticleFile, u64)> {
        match pointer {
            ArticlePointer::Global(p) => {
                let idx = self.files.partition_point(|f| f.base <= p);
                let file = idx
                    .checked_sub(1)
                    .and_then(|i| self.files.get(i))
                    .ok_or(DictError::IllegalRead {
                        position: p,
                        limit: self.files.first().map(|f| f.base).unwrap_or(0),
                    })?;
                Ok((file, p - file.base))
            }
            ArticlePointer::Local { file_no, offset } => {
                let file = self
                    .files
                    .iter()
                    .find(|f| f.file_no == file_no)
                    .ok_or_else(|| {
                        DictError::InvalidFormat(format!("No volume file number {}", file_no))
                    })?;
                Ok((file, offset))
            }
        }
    }

    /// Reads the still-compressed bytes of one record, bounds checked.
    pub fn read_raw(&self, pointer: ArticlePointer) -> Result<Vec<u8>> {
        let (file, offset) = self.locate(pointer)?;
        let limit = file.region_len();
        if offset.saturating_add(4) > limit {
            return Err(DictError::IllegalRead {
                position: offset,
                limit,
            });
        }
        let start = file.region_start + offset;
        let mut len_bytes = [0u8; 4];
        file.file.read_exact_at(start, &mut len_bytes)?;
        let len = BigEndian::read_u32(&len_bytes) as u64;
        if offset + 4 + len > limit {
            return Err(DictError::IllegalRead {
                position: offset + 4 + len,
                limit,
            });
        }
        trace!("article {} in file {}: {} bytes", pointer, file.file_no, len);
        file.file.read_vec_at(start + 4, len as usize)
    }

    /// Reads and decodes one record.
    ///
    /// Records no codec can decode are returned as raw text with no tags.
    pub fn read(&self, pointer: ArticlePointer) -> Result<(Payload, Option<Codec>)> {
        let raw = self.read_raw(pointer)?;
        match self.codecs.decode(&raw, content::decode_payload) {
            Some((payload, codec)) => Ok((payload, Some(codec))),
            None => {
                warn!(
                    "article {}: no codec in {:?} produced a payload, using raw bytes",
                    pointer,
                    self.codecs.order()
                );
                Ok((content::raw_payload(&raw), None))
            }
        }
    }

    pub fn close(&self) -> Result<()> {
        for file in &self.files {
            file.file.close()?;
        }
        Ok(())
    }
}
