use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use super::cache::{CacheStats, MemoCache};
use super::codec::CodecChain;
use super::collation::{CollationKey, Collator, Strength};
use super::format::content::Payload;
use super::format::header::{self, FileHeader, Metadata};
use super::index::cache_file::{self, CacheIdentity};
use super::index::short::{CacheTarget, ShortIndexOptions};
use super::index::{IndexOrigin, LongIndex, ShortIndex, Start};
use super::lookup::Lookup;
use super::store::{ArticleFile, ArticleStore};
use super::types::error::{DictError, Result};
use super::types::models::*;
use super::utils::{self, SharedFile};
use super::verify::Verify;
use super::worker::CancelToken;

/// Settings applied when opening a volume.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Strength lookups and ordering checks compare at.
    pub strength: Strength,
    pub collator: Arc<Collator>,
    /// Directory for short-index side caches; `None` disables them.
    pub cache_dir: Option<PathBuf>,
    /// Records scanned without a short index before one is built.
    pub index_threshold: u64,
    /// Deepest prefix an incremental build splits down to.
    pub max_prefix_depth: usize,
    /// Overrides the codec try-order derived from the header.
    pub codecs: Option<CodecChain>,
    pub article_cache_size: usize,
    pub miss_cache_size: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            strength: Strength::Primary,
            collator: Collator::shared(),
            cache_dir: None,
            index_threshold: 1000,
            max_prefix_depth: 6,
            codecs: None,
            article_cache_size: 256,
            miss_cache_size: 1024,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strength(mut self, strength: Strength) -> Self {
        self.strength = strength;
        self
    }

    pub fn collator(mut self, collator: Arc<Collator>) -> Self {
        self.collator = collator;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn index_threshold(mut self, threshold: u64) -> Self {
        self.index_threshold = threshold;
        self
    }

    pub fn max_prefix_depth(mut self, depth: usize) -> Self {
        self.max_prefix_depth = depth;
        self
    }

    pub fn codecs(mut self, codecs: CodecChain) -> Self {
        self.codecs = Some(codecs);
        self
    }

    pub fn article_cache_size(mut self, entries: usize) -> Self {
        self.article_cache_size = entries;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Open,
    Closed,
}

/// One opened dictionary, possibly spread over several files.
///
/// A volume is immutable once open. Lookups, article reads and
/// verification may run from several threads at once; only the short
/// index build is serialized, and it runs at most once.
#[derive(Debug)]
pub struct Volume {
    id: VolumeId,
    path: PathBuf,
    header: FileHeader,
    files: Vec<Arc<SharedFile>>,
    long: LongIndex,
    short: ShortIndex,
    store: ArticleStore,
    collator: Arc<Collator>,
    strength: Strength,
    articles: MemoCache<ArticlePointer, (Payload, Option<Codec>)>,
    closed: AtomicBool,
}

impl Volume {
    /// Opens the volume whose primary file is `path`.
    ///
    /// Sibling files `NAME00`, `NAME01`, ... are opened as announced by the
    /// primary's `file_count`, and must agree with it on the timestamp.
    ///
    /// # Errors
    /// - [`DictError::Format`] for a bad header, a missing or misnumbered
    ///   sibling, or index regions that do not fit the file
    /// - [`DictError::VolumeMismatch`] when a sibling has another timestamp
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening volume: {}", path.display());
        let primary = Arc::new(SharedFile::open(path)?);
        let header = header::parse(&mut primary.reader_at(0))?;
        let layout = header.index_layout()?;
        let meta = &header.metadata;
        let encoding = utils::parse_encoding(meta.encoding.as_deref().unwrap_or("UTF-8"));

        let mut files = vec![primary.clone()];
        let mut article_files = vec![ArticleFile {
            file_no: 0,
            base: meta.article_base,
            region_start: meta.article_offset,
            file: primary.clone(),
        }];
        for k in 0..meta.file_count.saturating_sub(1) {
            let (file, sibling) = open_sibling(path, k, &header)?;
            article_files.push(ArticleFile {
                file_no: sibling.metadata.file_no as u32,
                base: sibling.metadata.article_base,
                region_start: sibling.metadata.article_offset,
                file: file.clone(),
            });
            files.push(file);
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = VolumeId {
            title: meta.title.clone(),
            version: meta.version.clone(),
            file_name,
        };

        let codecs = options
            .codecs
            .clone()
            .unwrap_or_else(|| CodecChain::with_preferred(meta.codec_hint()));
        debug!("Codec order: {:?}", codecs.order());
        let store = ArticleStore::new(article_files, codecs);
        let long = LongIndex::open(primary.clone(), &header, &layout, encoding)?;

        let cache = options.cache_dir.as_deref().map(|dir| CacheTarget {
            path: cache_file::cache_path(dir, &id),
            identity: CacheIdentity {
                title: meta.title.clone(),
                version: meta.version.clone(),
                timestamp: meta.timestamp,
                index_count: layout.index_count,
                collator: options.collator.fingerprint(),
                max_depth: options.max_prefix_depth,
            },
        });
        let short = ShortIndex::new(
            options.collator.clone(),
            ShortIndexOptions {
                threshold: options.index_threshold,
                max_depth: options.max_prefix_depth,
                memo_capacity: options.miss_cache_size,
                cache,
            },
        );
        match layout.short_table {
            Some(table) => short.load_eager(&primary, table)?,
            None => {
                short.load_cached();
            }
        }

        info!(
            "Volume '{}' {} open: {} format, {} entries, {} file(s), short index {:?}",
            id.title,
            id.version,
            header.format,
            long.len(),
            files.len(),
            short.origin()
        );
        Ok(Self {
            id,
            path: path.to_path_buf(),
            header,
            files,
            long,
            short,
            store,
            collator: options.collator,
            strength: options.strength,
            articles: MemoCache::new(options.article_cache_size),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &VolumeId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.header.metadata
    }

    pub fn format(&self) -> FormatVersion {
        self.header.format
    }

    pub fn language(&self) -> &str {
        &self.header.metadata.language
    }

    pub fn strength(&self) -> Strength {
        self.strength
    }

    pub fn collator(&self) -> &Collator {
        &self.collator
    }

    /// Paths of every backing file, primary first.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path().to_path_buf()).collect()
    }

    /// Number of long index records.
    pub fn len(&self) -> u64 {
        self.long.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long.is_empty()
    }

    pub fn state(&self) -> VolumeState {
        if self.closed.load(Ordering::Acquire) {
            VolumeState::Closed
        } else {
            VolumeState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == VolumeState::Open
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            VolumeState::Open => Ok(()),
            VolumeState::Closed => Err(DictError::Closed),
        }
    }

    pub(crate) fn long(&self) -> &LongIndex {
        &self.long
    }

    pub(crate) fn short(&self) -> &ShortIndex {
        &self.short
    }

    pub(crate) fn store(&self) -> &ArticleStore {
        &self.store
    }

    /// Collation key of `word` at this volume's strength.
    pub fn key(&self, word: &str) -> CollationKey {
        self.collator.key(word, self.strength)
    }

    /// Entries whose key starts with the key of `word`, in index order.
    pub fn lookup(&self, word: &str) -> Result<Lookup<'_>> {
        self.lookup_with(word, CancelToken::new())
    }

    /// Like [`lookup`](Self::lookup), stopping early once `cancel` is set.
    ///
    /// When enough records were scanned without a short index, the index is
    /// built first under the same token.
    pub fn lookup_with(&self, word: &str, cancel: CancelToken) -> Result<Lookup<'_>> {
        self.ensure_open()?;
        if self.short.wants_build() {
            match self.build_short_index(&cancel) {
                Ok(_) => {}
                Err(DictError::Cancelled) => return Err(DictError::Cancelled),
                Err(e) => warn!("Short index build failed, scanning without it: {}", e),
            }
        }
        let query = self.key(word);
        let start = self.short.start(&query);
        debug!("lookup '{}' in '{}': start {:?}", word, self.id.title, start);
        Ok(Lookup::new(self, query, start, cancel))
    }

    /// Every homograph of `word`: entries whose key equals its key.
    pub fn lookup_exact(&self, word: &str) -> Result<Vec<IndexEntry>> {
        let query = self.key(word);
        Ok(self
            .lookup(word)?
            .filter(|entry| self.key(&entry.word) == query)
            .collect())
    }

    /// All records in index order.
    pub fn entries(&self) -> Result<super::index::Scan<'_>> {
        self.ensure_open()?;
        Ok(self.long.scan())
    }

    pub fn handle(&self, entry: &IndexEntry) -> ArticleHandle {
        ArticleHandle {
            pointer: entry.article,
            title: entry.word.clone(),
            volume: self.id.clone(),
        }
    }

    /// Reads and decodes the article a handle points at.
    pub fn read_article(&self, handle: &ArticleHandle) -> Result<Article> {
        self.ensure_open()?;
        if handle.volume != self.id {
            return Err(DictError::UnknownVolume(handle.volume.to_string()));
        }
        let (payload, codec) = match self.articles.get(&handle.pointer) {
            Some(cached) => cached,
            None => {
                let decoded = self.store.read(handle.pointer)?;
                self.articles.insert(handle.pointer, decoded.clone());
                decoded
            }
        };
        Ok(Article {
            title: handle.title.clone(),
            text: payload.text,
            tags: payload.tags,
            redirect: payload.redirect,
            codec,
            volume: self.id.clone(),
        })
    }

    /// Structural check of every record; see [`Verify`].
    pub fn verify(&self) -> Result<Verify<'_>> {
        self.verify_with(CancelToken::new())
    }

    pub fn verify_with(&self, cancel: CancelToken) -> Result<Verify<'_>> {
        self.ensure_open()?;
        info!("Verifying '{}' ({} records)", self.id.title, self.long.len());
        Ok(Verify::new(self, cancel))
    }

    /// Builds the short index from a full scan unless one is already in place.
    ///
    /// Returns `Ok(true)` when this call built it.
    pub fn build_short_index(&self, cancel: &CancelToken) -> Result<bool> {
        self.ensure_open()?;
        let records = self
            .long
            .scan()
            .map(|entry| entry.map(|e| (e.position, e.word)));
        self.short.build(records, cancel)
    }

    pub fn short_index_origin(&self) -> IndexOrigin {
        self.short.origin()
    }

    /// Where a lookup for `word` would begin.
    pub fn short_index_start(&self, word: &str) -> Start {
        self.short.start(&self.key(word))
    }

    /// Counters of the known-miss prefix memo.
    pub fn cache_stats(&self) -> CacheStats {
        self.short.stats()
    }

    pub fn article_cache_stats(&self) -> CacheStats {
        self.articles.stats()
    }

    /// Releases every file handle. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.store.close()?;
        self.articles.clear();
        info!("Volume '{}' closed", self.id.title);
        Ok(())
    }
}

/// Path of sibling `k` (0-based) of a multi-file volume.
pub fn sibling_path(primary: &Path, k: u64) -> PathBuf {
    let mut name = primary.file_name().unwrap_or_default().to_os_string();
    name.push(format!("{:02}", k));
    primary.with_file_name(name)
}

fn open_sibling(primary: &Path, k: u64, expected: &FileHeader) -> Result<(Arc<SharedFile>, FileHeader)> {
    let path = sibling_path(primary, k);
    if !path.is_file() {
        return Err(DictError::Format(format!(
            "Volume file {} of {} is missing: {}",
            k + 2,
            expected.metadata.file_count,
            path.display()
        )));
    }
    let file = Arc::new(SharedFile::open(&path)?);
    let header = header::parse(&mut file.reader_at(0))?;
    let meta = &header.metadata;
    if meta.file_no != k + 1 {
        return Err(DictError::Format(format!(
            "{} carries file_no {}, expected {}",
            path.display(),
            meta.file_no,
            k + 1
        )));
    }
    if header.format != expected.format {
        return Err(DictError::Format(format!(
            "{} is {} but the primary file is {}",
            path.display(),
            header.format,
            expected.format
        )));
    }
    if meta.timestamp != expected.metadata.timestamp {
        return Err(DictError::VolumeMismatch {
            path,
            expected: expected.metadata.timestamp,
            found: meta.timestamp,
        });
    }
    debug!(
        "Sibling {} opened: article base {}, region at {}",
        path.display(),
        meta.article_base,
        meta.article_offset
    );
    Ok((file, header))
}
