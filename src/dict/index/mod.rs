//! Index layer: the authoritative long index and its short-index accelerator.
//!
//! # Module Organization
//!
//! - [`linked`]: legacy records chained by forward offsets
//! - [`array`]: fixed-stride records with binary search
//! - [`short`]: prefix -> start position maps
//! - [`cache_file`]: persistence of incrementally built short indexes

use std::sync::Arc;

use encoding_rs::Encoding;

use crate::dict::format::header::{FileHeader, IndexLayout};
use crate::dict::types::error::{DictError, Result};
use crate::dict::types::models::{FormatVersion, IndexEntry};
use crate::dict::utils::SharedFile;

pub mod array;
pub mod cache_file;
pub mod linked;
pub mod short;

pub use array::{ArrayIndex, RecordLayout};
pub use linked::LinkedIndex;
pub use short::{IndexOrigin, ShortIndex, Start};

/// Long index reader, chosen by the format token at open time.
#[derive(Debug)]
pub enum LongIndex {
    Linked(LinkedIndex),
    Array(ArrayIndex),
}

impl LongIndex {
    pub fn open(
        file: Arc<SharedFile>,
        header: &FileHeader,
        layout: &IndexLayout,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let article_offset = header.metadata.article_offset;
        match header.format {
            FormatVersion::Linked => Ok(LongIndex::Linked(LinkedIndex::new(
                file,
                layout.index_offset,
                article_offset,
                layout.index_count,
                encoding,
            )?)),
            format => {
                let layout_kind = match format {
                    FormatVersion::Positional => RecordLayout::Positional,
                    _ => RecordLayout::FixedRecord,
                };
                let words_offset = layout.words_offset.ok_or_else(|| {
                    DictError::Format("array index without words_offset".to_string())
                })?;
                Ok(LongIndex::Array(ArrayIndex::new(
                    file,
                    layout_kind,
                    layout.index_offset,
                    layout.index_count,
                    words_offset,
                    article_offset,
                    encoding,
                )?))
            }
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            LongIndex::Linked(index) => index.len(),
            LongIndex::Array(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the first record, if any.
    pub fn first(&self) -> Option<u64> {
        match self {
            LongIndex::Linked(index) => index.first(),
            LongIndex::Array(index) => (!index.is_empty()).then_some(0),
        }
    }

    pub fn read_at(&self, position: u64) -> Result<IndexEntry> {
        match self {
            LongIndex::Linked(index) => index.read_at(position),
            LongIndex::Array(index) => index.read_at(position),
        }
    }

    /// Every record in index order, stopping after the first error.
    pub fn scan(&self) -> Scan<'_> {
        Scan {
            index: self,
            next: self.first(),
            read: 0,
        }
    }
}

/// Sequential walk over a [`LongIndex`].
pub struct Scan<'a> {
    index: &'a LongIndex,
    next: Option<u64>,
    read: u64,
}

impl Iterator for Scan<'_> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.next.take()?;
        // A linked chain longer than index_count would otherwise never end.
        if self.read >= self.index.len() {
            return None;
        }
        match self.index.read_at(position) {
            Ok(entry) => {
                self.read += 1;
                self.next = entry.next;
                Some(Ok(entry))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
