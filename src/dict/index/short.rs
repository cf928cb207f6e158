//! Short (prefix) index: an accelerator from word prefixes to a start
//! position in the long index.
//!
//! Prefixes are stored as primary collation weights, one map per prefix
//! depth. A stored position is always the first record of a run sharing
//! that prefix, so starting a scan there never skips a match. When the
//! same prefix shows up in separate runs the index keeps every start
//! position as a candidate instead of overwriting.
//!
//! ```text
//! depth 1:  [a]      -> {0}
//!           [b]      -> {1200}
//! depth 2:  [a][b]   -> {0}
//!           [a][c]   -> {310, 904}     ambiguous
//! ```
//!
//! The index comes from one of three places: an eager table stored in the
//! volume file, a side-cache file from an earlier run, or an incremental
//! build once lookups have scanned enough records without a hint.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError};

use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, trace, warn};

use super::cache_file::{BucketList, CacheIdentity, IndexCacheFile};
use crate::dict::cache::{CacheStats, MemoCache};
use crate::dict::collation::{CollationKey, Collator, Strength};
use crate::dict::format::header::ShortTableLayout;
use crate::dict::types::error::{DictError, Result};
use crate::dict::utils::SharedFile;
use crate::dict::worker::CancelToken;

/// Where a scan should begin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Start {
    /// No usable prefix; scan from the first record.
    Beginning,
    /// Candidate positions, ascending. `depth` is the matched prefix depth.
    Hint { positions: Vec<u64>, depth: usize },
    /// No record can match.
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Empty,
    Eager,
    Built,
    Cached,
}

impl IndexOrigin {
    /// True when every first primary weight of the volume is present.
    /// Eager tables come from the file and are not relied on for that.
    fn is_complete(&self) -> bool {
        matches!(self, IndexOrigin::Built | IndexOrigin::Cached)
    }
}

/// Where to persist built buckets.
#[derive(Debug, Clone)]
pub struct CacheTarget {
    pub path: PathBuf,
    pub identity: CacheIdentity,
}

#[derive(Debug, Clone)]
pub struct ShortIndexOptions {
    pub threshold: u64,
    pub max_depth: usize,
    pub memo_capacity: usize,
    pub cache: Option<CacheTarget>,
}

#[derive(Debug, Default)]
struct Buckets {
    maps: Vec<BTreeMap<Vec<u8>, Vec<u64>>>,
}

impl Buckets {
    /// Adds a candidate; returns true when the prefix now has several.
    fn insert(&mut self, depth: usize, prefix: Vec<u8>, position: u64) -> bool {
        while self.maps.len() < depth {
            self.maps.push(BTreeMap::new());
        }
        let slot = self.maps[depth - 1].entry(prefix).or_default();
        if slot.contains(&position) {
            return false;
        }
        slot.push(position);
        slot.sort_unstable();
        slot.len() > 1
    }

    fn prefix_count(&self) -> usize {
        self.maps.iter().map(BTreeMap::len).sum()
    }

    fn to_list(&self) -> BucketList {
        self.maps
            .iter()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .collect()
    }

    fn from_list(list: BucketList) -> Self {
        Self {
            maps: list.into_iter().map(|level| level.into_iter().collect()).collect(),
        }
    }
}

#[derive(Debug)]
struct State {
    buckets: Buckets,
    origin: IndexOrigin,
}

#[derive(Debug)]
pub struct ShortIndex {
    collator: Arc<Collator>,
    state: RwLock<State>,
    /// Keys known to have no match.
    misses: MemoCache<Vec<u8>, ()>,
    writer: Mutex<()>,
    scanned: AtomicU64,
    options: ShortIndexOptions,
}

impl ShortIndex {
    pub fn new(collator: Arc<Collator>, options: ShortIndexOptions) -> Self {
        Self {
            collator,
            state: RwLock::new(State {
                buckets: Buckets::default(),
                origin: IndexOrigin::Empty,
            }),
            misses: MemoCache::new(options.memo_capacity),
            writer: Mutex::new(()),
            scanned: AtomicU64::new(0),
            options,
        }
    }

    /// Loads the eager table stored in the volume file.
    ///
    /// Each entry holds `depth` code points (zero padded) and a position.
    pub fn load_eager(&self, file: &SharedFile, layout: ShortTableLayout) -> Result<()> {
        let (entry_len, total) = match (layout.entry_len(), layout.byte_len()) {
            (Some(entry_len), Some(total)) => (entry_len, total),
            _ => return Err(DictError::Format("short index table size overflows".to_string())),
        };
        if layout.offset.checked_add(total).is_none_or(|end| end > file.len()) {
            return Err(DictError::Format(format!(
                "short index table of {} bytes at {} runs past end of file ({} bytes)",
                total,
                layout.offset,
                file.len()
            )));
        }
        let raw = file.read_vec_at(layout.offset, total as usize).map_err(|e| match e {
            DictError::IllegalRead { .. } => {
                DictError::Format(format!("short index table truncated: {}", e))
            }
            other => other,
        })?;

        let mut buckets = Buckets::default();
        for entry in raw.chunks_exact(entry_len as usize) {
            let (chars, position) = entry.split_at(layout.depth * 4);
            let mut prefix = String::with_capacity(layout.depth);
            for cp in chars.chunks_exact(4).map(BigEndian::read_u32) {
                if cp == 0 {
                    break;
                }
                let c = char::from_u32(cp).ok_or_else(|| {
                    DictError::Format(format!("short index entry has invalid code point {:#x}", cp))
                })?;
                prefix.push(c);
            }
            let key = self.collator.key(&prefix, Strength::Primary);
            let weights = key.primary_weights();
            if weights.is_empty() {
                continue;
            }
            let position = BigEndian::read_u64(position);
            if buckets.insert(weights.len() / 2, weights.to_vec(), position) {
                warn!("eager short index lists '{}' at several positions", prefix);
            }
        }
        info!(
            "Eager short index loaded: {} entries, {} prefixes, depth {}",
            layout.count,
            buckets.prefix_count(),
            layout.depth
        );
        self.commit(buckets, IndexOrigin::Eager)
    }

    /// Adopts a side-cache file when it was built for this exact volume.
    pub fn load_cached(&self) -> bool {
        let Some(target) = &self.options.cache else {
            return false;
        };
        match IndexCacheFile::read(&target.path) {
            Ok(Some(cached)) if cached.identity == target.identity => {
                let buckets = Buckets::from_list(cached.buckets);
                info!(
                    "Short index loaded from {} ({} prefixes)",
                    target.path.display(),
                    buckets.prefix_count()
                );
                self.commit(buckets, IndexOrigin::Cached).is_ok()
            }
            Ok(Some(cached)) => {
                warn!(
                    "Discarding index cache {}: built for '{}' {}",
                    target.path.display(),
                    cached.identity.title,
                    cached.identity.version
                );
                false
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Discarding index cache {}: {}", target.path.display(), e);
                false
            }
        }
    }

    pub fn origin(&self) -> IndexOrigin {
        self.state
            .read()
            .map(|state| state.origin)
            .unwrap_or(IndexOrigin::Empty)
    }

    pub fn is_complete(&self) -> bool {
        self.origin().is_complete()
    }

    /// Number of stored prefixes over all depths.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| state.buckets.prefix_count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds where a scan for `query` should begin, trying the longest
    /// prefix first.
    pub fn start(&self, query: &CollationKey) -> Start {
        if self.misses.get(&query.as_bytes().to_vec()).is_some() {
            debug!("{:?} is a known miss", query);
            return Start::Miss;
        }
        let weights = query.primary_weights();
        if weights.is_empty() {
            return Start::Beginning;
        }
        let Ok(state) = self.state.read() else {
            return Start::Beginning;
        };
        let deepest = (weights.len() / 2).min(state.buckets.maps.len());
        for depth in (1..=deepest).rev() {
            if let Some(positions) = state.buckets.maps[depth - 1].get(&weights[..depth * 2]) {
                trace!("prefix hit at depth {}: {:?}", depth, positions);
                return Start::Hint {
                    positions: positions.clone(),
                    depth,
                };
            }
        }
        if state.origin.is_complete() {
            drop(state);
            self.record_miss(query);
            return Start::Miss;
        }
        Start::Beginning
    }

    pub fn record_miss(&self, query: &CollationKey) {
        self.misses.insert(query.as_bytes().to_vec(), ());
    }

    /// Counts records a lookup had to scan without a hint.
    pub fn note_scanned(&self, records: u64) {
        if records > 0 && !self.is_complete() {
            let total = self.scanned.fetch_add(records, Ordering::Relaxed) + records;
            trace!("{} records scanned without a short index", total);
        }
    }

    pub fn wants_build(&self) -> bool {
        !self.is_complete() && self.scanned.load(Ordering::Relaxed) > self.options.threshold
    }

    /// Builds the index from every `(position, word)` of the long index, in
    /// order. Returns `Ok(false)` when another build is running or the index
    /// is already complete.
    ///
    /// Nothing is committed unless the whole sequence was consumed.
    pub fn build<I>(&self, records: I, cancel: &CancelToken) -> Result<bool>
    where
        I: IntoIterator<Item = Result<(u64, String)>>,
    {
        let _writer = match self.writer.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!("Short index build already in progress");
                return Ok(false);
            }
            Err(TryLockError::Poisoned(_)) => return Err(DictError::LockPoisoned),
        };
        if self.is_complete() {
            return Ok(false);
        }

        info!(
            "Building short index (threshold {}, max depth {})",
            self.options.threshold, self.options.max_depth
        );
        let mut keyed = Vec::new();
        for record in records {
            cancel.check()?;
            let (position, word) = record?;
            let key = self.collator.key(&word, Strength::Primary);
            keyed.push((key.primary_weights().to_vec(), position));
        }

        let mut buckets = Buckets::default();
        let ambiguous = bucket_runs(
            &keyed,
            1,
            self.options.max_depth.max(1),
            self.options.threshold,
            &mut buckets,
        );
        info!(
            "Short index built: {} records, {} prefixes, {} ambiguous",
            keyed.len(),
            buckets.prefix_count(),
            ambiguous
        );

        if let Some(target) = &self.options.cache {
            let file = IndexCacheFile {
                identity: target.identity.clone(),
                buckets: buckets.to_list(),
            };
            if let Err(e) = file.write(&target.path) {
                warn!("Could not write index cache {}: {}", target.path.display(), e);
            }
        }
        self.commit(buckets, IndexOrigin::Built)?;
        Ok(true)
    }

    fn commit(&self, buckets: Buckets, origin: IndexOrigin) -> Result<()> {
        let mut state = self.state.write().map_err(|_| DictError::LockPoisoned)?;
        state.buckets = buckets;
        state.origin = origin;
        Ok(())
    }

    /// Counters of the known-miss memo.
    pub fn stats(&self) -> CacheStats {
        self.misses.stats()
    }
}

/// Records each contiguous run of a shared `depth`-weight prefix, then
/// splits runs longer than `threshold` one weight deeper.
fn bucket_runs(
    records: &[(Vec<u8>, u64)],
    depth: usize,
    max_depth: usize,
    threshold: u64,
    out: &mut Buckets,
) -> usize {
    let width = depth * 2;
    let mut ambiguous = 0;
    let mut i = 0;
    while i < records.len() {
        let Some(prefix) = records[i].0.get(..width) else {
            i += 1;
            continue;
        };
        let mut j = i + 1;
        while j < records.len() && records[j].0.get(..width) == Some(prefix) {
            j += 1;
        }
        if out.insert(depth, prefix.to_vec(), records[i].1) {
            warn!(
                "prefix {} at depth {} starts another run at {}; keeping both",
                hex::encode(prefix),
                depth,
                records[i].1
            );
            ambiguous += 1;
        }
        if (j - i) as u64 > threshold && depth < max_depth {
            ambiguous += bucket_runs(&records[i..j], depth + 1, max_depth, threshold, out);
        }
        i = j;
    }
    ambiguous
}
