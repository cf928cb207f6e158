//! Sequential structural check of a whole volume.
//!
//! Every record is read in index order. For each one the verifier checks
//! that its key does not sort before the previous key, and that its article
//! record lies fully inside the owning file. Progress is yielded as a
//! fraction after each record; the first inconsistency is yielded as
//! [`DictError::Verify`] and ends the sequence.

use log::{info, warn};

use super::collation::CollationKey;
use super::types::error::{DictError, Result};
use super::volume::Volume;
use super::worker::CancelToken;

/// Created by [`Volume::verify`].
pub struct Verify<'a> {
    volume: &'a Volume,
    cursor: Option<u64>,
    record: u64,
    count: u64,
    previous: Option<(String, CollationKey)>,
    cancel: CancelToken,
    done: bool,
}

impl<'a> Verify<'a> {
    pub(crate) fn new(volume: &'a Volume, cancel: CancelToken) -> Self {
        Self {
            volume,
            cursor: volume.long().first(),
            record: 0,
            count: volume.long().len(),
            previous: None,
            cancel,
            done: false,
        }
    }

    fn reject(&mut self, reason: String) -> Option<Result<f64>> {
        warn!("Verification of '{}' failed at record {}: {}", self.volume.id().title, self.record, reason);
        self.done = true;
        Some(Err(DictError::Verify {
            record: self.record,
            reason,
        }))
    }

    fn check_record(&mut self, position: u64) -> std::result::Result<(), String> {
        let entry = self
            .volume
            .long()
            .read_at(position)
            .map_err(|e| format!("index record at {}: {}", position, e))?;

        let key = self.volume.key(&entry.word);
        if let Some((previous, previous_key)) = &self.previous {
            if key < *previous_key {
                return Err(format!("'{}' sorts before the preceding '{}'", entry.word, previous));
            }
        }

        self.volume
            .store()
            .read_raw(entry.article)
            .map_err(|e| format!("article {} of '{}': {}", entry.article, entry.word, e))?;

        self.cursor = entry.next;
        self.previous = Some((entry.word, key));
        Ok(())
    }
}

impl Iterator for Verify<'_> {
    type Item = Result<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.cancel.check() {
            self.done = true;
            return Some(Err(e));
        }
        if self.count == 0 {
            self.done = true;
            return Some(Ok(1.0));
        }

        let Some(position) = self.cursor else {
            self.done = true;
            if self.record < self.count {
                return self.reject(format!(
                    "index ends after {} of {} records",
                    self.record, self.count
                ));
            }
            info!("Verified '{}': {} records", self.volume.id().title, self.count);
            return None;
        };
        if self.record >= self.count {
            return self.reject(format!("index continues past {} records", self.count));
        }

        if let Err(reason) = self.check_record(position) {
            return self.reject(reason);
        }
        self.record += 1;
        Some(Ok(self.record as f64 / self.count as f64))
    }
}
