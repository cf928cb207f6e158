//! Prefix lookup cursor over a volume's long index.
//!
//! Records are sorted by their finest collation key, so the records whose
//! primary weights start with the query's primary weights form one
//! contiguous range. The cursor finds the start of that range, walks it,
//! and yields the records whose key at the volume strength starts with the
//! query key.
//!
//! ```text
//!   short index ──► candidate ──► Seeking ──► Matching ──► Done
//!                       ▲            │ past range,
//!                       └────────────┘ nothing found
//! ```
//!
//! Read errors end the walk early: the entries already yielded stand, the
//! error is logged and kept for [`Lookup::error`].

use std::collections::VecDeque;

use log::{debug, trace, warn};

use super::collation::CollationKey;
use super::index::{LongIndex, Start};
use super::types::error::DictError;
use super::types::models::{ArticleHandle, IndexEntry};
use super::volume::Volume;
use super::worker::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Walking toward the range from a candidate start.
    Seeking,
    /// Inside the range; leaving it ends the lookup.
    Matching,
    Done,
}

/// Lazy sequence of matching entries, created by [`Volume::lookup`].
pub struct Lookup<'a> {
    volume: &'a Volume,
    query: CollationKey,
    candidates: VecDeque<u64>,
    cursor: Option<u64>,
    phase: Phase,
    hinted: bool,
    cancel: CancelToken,
    scanned: u64,
    matched: u64,
    error: Option<DictError>,
}

impl<'a> Lookup<'a> {
    pub(crate) fn new(volume: &'a Volume, query: CollationKey, start: Start, cancel: CancelToken) -> Self {
        let (candidates, phase, hinted) = match start {
            Start::Miss => (VecDeque::new(), Phase::Done, true),
            Start::Beginning => (volume.long().first().into_iter().collect(), Phase::Seeking, false),
            Start::Hint { positions, .. } => (positions.into(), Phase::Seeking, true),
        };
        Self {
            volume,
            query,
            candidates,
            cursor: None,
            phase,
            hinted,
            cancel,
            scanned: 0,
            matched: 0,
            error: None,
        }
    }

    pub fn query(&self) -> &CollationKey {
        &self.query
    }

    /// Records read so far.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    /// Entries yielded so far.
    pub fn matched(&self) -> u64 {
        self.matched
    }

    /// The error that ended the walk, if any. Cancellation shows up here
    /// as [`DictError::Cancelled`].
    pub fn error(&self) -> Option<&DictError> {
        self.error.as_ref()
    }

    /// Collects at most `limit` matches as article handles.
    pub fn handles(self, limit: usize) -> Vec<ArticleHandle> {
        let volume = self.volume;
        self.take(limit).map(|entry| volume.handle(&entry)).collect()
    }

    /// Moves to the next candidate start. Returns false when none is left
    /// or a candidate already produced the range.
    fn next_candidate(&mut self) -> bool {
        if self.phase == Phase::Matching {
            return false;
        }
        let Some(candidate) = self.candidates.pop_front() else {
            return false;
        };
        let volume = self.volume;
        self.cursor = match volume.long() {
            LongIndex::Linked(_) => Some(candidate),
            LongIndex::Array(index) => {
                match index.lower_bound(volume.collator(), &self.query, candidate, &self.cancel) {
                    Ok(position) if position < index.len() => Some(position),
                    Ok(_) => None,
                    Err(e) => {
                        self.fail(e);
                        return false;
                    }
                }
            }
        };
        trace!("lookup candidate {} -> cursor {:?}", candidate, self.cursor);
        true
    }

    fn fail(&mut self, error: DictError) {
        match &error {
            DictError::Cancelled => debug!("lookup cancelled after {} records", self.scanned),
            other => warn!("lookup in '{}' stopped: {}", self.volume.id().title, other),
        }
        self.error = Some(error);
        self.phase = Phase::Done;
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        if self.matched == 0 && self.error.is_none() {
            self.volume.short().record_miss(&self.query);
        }
    }
}

impl Iterator for Lookup<'_> {
    type Item = IndexEntry;

    fn next(&mut self) -> Option<IndexEntry> {
        loop {
            if self.phase == Phase::Done {
                return None;
            }
            let Some(position) = self.cursor else {
                if !self.next_candidate() && self.phase != Phase::Done {
                    self.finish();
                }
                continue;
            };
            if let Err(e) = self.cancel.check() {
                self.fail(e);
                continue;
            }
            let entry = match self.volume.long().read_at(position) {
                Ok(entry) => entry,
                Err(e) => {
                    self.fail(e);
                    continue;
                }
            };
            self.scanned += 1;
            self.cursor = entry.next;

            let key = self.volume.key(&entry.word);
            let primary = key.primary_weights();
            let target = self.query.primary_weights();
            if primary.starts_with(target) {
                self.phase = Phase::Matching;
                if key.starts_with(&self.query) {
                    self.matched += 1;
                    return Some(entry);
                }
            } else if primary > target {
                trace!("'{}' is past the range", entry.word);
                self.cursor = None;
            }
        }
    }
}

impl Drop for Lookup<'_> {
    fn drop(&mut self) {
        if !self.hinted {
            self.volume.short().note_scanned(self.scanned);
        }
    }
}
