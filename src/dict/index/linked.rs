//! Legacy linked-record long index.
//!
//! Records sit at variable offsets inside `[index_offset, article_offset)`:
//!
//! ```text
//! [u32] next   forward distance to the following record, 0 on the last
//! [u32] prev   backward distance to the previous record, 0 on the first
//! [u16] len
//! [len] word bytes
//! [u64] global article pointer
//! ```
//!
//! Positions are offsets relative to the start of the region. There is no
//! random access by ordinal, so lookups start wherever the short index
//! points and walk forward.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use encoding_rs::Encoding;

use crate::dict::types::error::{DictError, Result};
use crate::dict::types::models::{ArticlePointer, IndexEntry};
use crate::dict::utils::{self, SharedFile};

/// Fixed part of a record: next, prev, len.
const RECORD_HEAD: u64 = 10;
const RECORD_TAIL: u64 = 8;

#[derive(Debug)]
pub struct LinkedIndex {
    file: Arc<SharedFile>,
    region_start: u64,
    region_len: u64,
    count: u64,
    encoding: &'static Encoding,
}

impl LinkedIndex {
    pub fn new(
        file: Arc<SharedFile>,
        index_offset: u64,
        article_offset: u64,
        count: u64,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        if article_offset > file.len() {
            return Err(DictError::Format(format!(
                "article_offset {} beyond end of file ({} bytes)",
                article_offset,
                file.len()
            )));
        }
        Ok(Self {
            file,
            region_start: index_offset,
            region_len: article_offset - index_offset,
            count,
            encoding,
        })
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn region_len(&self) -> u64 {
        self.region_len
    }

    /// Reads the record at region-relative offset `pos`.
    ///
    /// Any part of the record falling outside the region is an illegal read.
    pub fn read_at(&self, pos: u64) -> Result<IndexEntry> {
        if pos.saturating_add(RECORD_HEAD) > self.region_len {
            return Err(DictError::IllegalRead {
                position: pos,
                limit: self.region_len,
            });
        }
        let mut head = [0u8; RECORD_HEAD as usize];
        self.file.read_exact_at(self.region_start + pos, &mut head)?;
        let next = BigEndian::read_u32(&head[0..4]) as u64;
        let word_len = BigEndian::read_u16(&head[8..10]) as u64;

        let end = pos + RECORD_HEAD + word_len + RECORD_TAIL;
        if end > self.region_len {
            return Err(DictError::IllegalRead {
                position: end,
                limit: self.region_len,
            });
        }
        let body = self
            .file
            .read_vec_at(self.region_start + pos + RECORD_HEAD, (word_len + RECORD_TAIL) as usize)?;
        let word = utils::decode_text(&body[..word_len as usize], self.encoding);
        let article = BigEndian::read_u64(&body[word_len as usize..]);

        Ok(IndexEntry {
            word,
            position: pos,
            next: (next != 0).then(|| pos + next),
            article: ArticlePointer::Global(article),
        })
    }

    pub fn first(&self) -> Option<u64> {
        (self.count > 0).then_some(0)
    }
}

/// Encodes one record. Used by the offline compiler.
pub fn encode_record(next: u32, prev: u32, word: &[u8], article: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(record_len(word.len()) as usize);
    let mut buf = [0u8; 8];
    BigEndian::write_u32(&mut buf[..4], next);
    out.extend_from_slice(&buf[..4]);
    BigEndian::write_u32(&mut buf[..4], prev);
    out.extend_from_slice(&buf[..4]);
    BigEndian::write_u16(&mut buf[..2], word.len() as u16);
    out.extend_from_slice(&buf[..2]);
    out.extend_from_slice(word);
    BigEndian::write_u64(&mut buf, article);
    out.extend_from_slice(&buf);
    out
}

pub fn record_len(word_len: usize) -> u64 {
    RECORD_HEAD + word_len as u64 + RECORD_TAIL
}
