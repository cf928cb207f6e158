//! Fixed-stride long index.
//!
//! ```text
//! Positional (POS1), 12 bytes per record:
//!   [u32] word_ptr   offset into the words region
//!   [u64] article    global article pointer
//!
//! Fixed-record (FIX1), 12 bytes per record:
//!   [u32] word_ptr
//!   [u32] file_no
//!   [u32] article    offset inside that file's article region
//!
//! Words region: [u16] len, [len] bytes
//! ```
//!
//! Positions are record ordinals, which makes binary search possible.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use encoding_rs::Encoding;
use log::trace;

use crate::dict::collation::{CollationKey, Collator, Strength};
use crate::dict::types::error::{DictError, Result};
use crate::dict::types::models::{ArticlePointer, IndexEntry};
use crate::dict::utils::{self, SharedFile};
use crate::dict::worker::CancelToken;

pub const RECORD_STRIDE: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    Positional,
    FixedRecord,
}

#[derive(Debug)]
pub struct ArrayIndex {
    file: Arc<SharedFile>,
    layout: RecordLayout,
    records_start: u64,
    count: u64,
    words_start: u64,
    words_end: u64,
    encoding: &'static Encoding,
}

impl ArrayIndex {
    pub fn new(
        file: Arc<SharedFile>,
        layout: RecordLayout,
        index_offset: u64,
        count: u64,
        words_offset: u64,
        article_offset: u64,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let records_end = count
            .checked_mul(RECORD_STRIDE)
            .and_then(|len| len.checked_add(index_offset))
            .ok_or_else(|| DictError::Format(format!("index_count {} overflows", count)))?;
        if records_end > words_offset {
            return Err(DictError::Format(format!(
                "{} records of {} bytes overlap the words region at {}",
                count, RECORD_STRIDE, words_offset
            )));
        }
        if article_offset > file.len() {
            return Err(DictError::Format(format!(
                "article_offset {} beyond end of file ({} bytes)",
                article_offset,
                file.len()
            )));
        }
        Ok(Self {
            file,
            layout,
            records_start: index_offset,
            count,
            words_start: words_offset,
            words_end: article_offset,
            encoding,
        })
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn read_at(&self, position: u64) -> Result<IndexEntry> {
        let (word_ptr, article) = self.record(position)?;
        Ok(IndexEntry {
            word: self.word(word_ptr)?,
            position,
            next: (position + 1 < self.count).then_some(position + 1),
            article,
        })
    }

    /// Word of record `position` without resolving its article.
    pub fn word_at(&self, position: u64) -> Result<String> {
        let (word_ptr, _) = self.record(position)?;
        self.word(word_ptr)
    }

    fn record(&self, position: u64) -> Result<(u64, ArticlePointer)> {
        if position >= self.count {
            return Err(DictError::IllegalRead {
                position,
                limit: self.count,
            });
        }
        let mut raw = [0u8; RECORD_STRIDE as usize];
        self.file
            .read_exact_at(self.records_start + position * RECORD_STRIDE, &mut raw)?;
        let word_ptr = BigEndian::read_u32(&raw[0..4]) as u64;
        let article = match self.layout {
            RecordLayout::Positional => ArticlePointer::Global(BigEndian::read_u64(&raw[4..12])),
            RecordLayout::FixedRecord => ArticlePointer::Local {
                file_no: BigEndian::read_u32(&raw[4..8]),
                offset: BigEndian::read_u32(&raw[8..12]) as u64,
            },
        };
        Ok((word_ptr, article))
    }

    fn word(&self, word_ptr: u64) -> Result<String> {
        let start = self.words_start + word_ptr;
        if start + 2 > self.words_end {
            return Err(DictError::IllegalRead {
                position: start,
                limit: self.words_end,
            });
        }
        let mut len = [0u8; 2];
        self.file.read_exact_at(start, &mut len)?;
        let len = BigEndian::read_u16(&len) as u64;
        if start + 2 + len > self.words_end {
            return Err(DictError::IllegalRead {
                position: start + 2 + len,
                limit: self.words_end,
            });
        }
        let bytes = self.file.read_vec_at(start + 2, len as usize)?;
        Ok(utils::decode_text(&bytes, self.encoding))
    }

    /// First position in `[from, len)` whose primary key is not less than
    /// `query`'s. `from` must not be past that position.
    pub fn lower_bound(
        &self,
        collator: &Collator,
        query: &CollationKey,
        from: u64,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let target = query.primary_weights();
        let (mut lo, mut hi) = (from.min(self.count), self.count);
        let mut probes = 0u32;
        while lo < hi {
            cancel.check()?;
            let mid = lo + (hi - lo) / 2;
            let word = self.word_at(mid)?;
            let key = collator.key(&word, Strength::Primary);
            if key.primary_weights() < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
            probes += 1;
        }
        trace!("lower_bound settled at {} after {} probes", lo, probes);
        Ok(lo)
    }
}

/// Encodes one positional record. Used by the offline compiler.
pub fn encode_positional(word_ptr: u32, article: u64) -> [u8; RECORD_STRIDE as usize] {
    let mut out = [0u8; RECORD_STRIDE as usize];
    BigEndian::write_u32(&mut out[0..4], word_ptr);
    BigEndian::write_u64(&mut out[4..12], article);
    out
}

/// Encodes one fixed record. Used by the offline compiler.
pub fn encode_fixed(word_ptr: u32, file_no: u32, article: u32) -> [u8; RECORD_STRIDE as usize] {
    let mut out = [0u8; RECORD_STRIDE as usize];
    BigEndian::write_u32(&mut out[0..4], word_ptr);
    BigEndian::write_u32(&mut out[4..8], file_no);
    BigEndian::write_u32(&mut out[8..12], article);
    out
}
