//! A set of open volumes queried together, and redirect resolution.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};

use super::collation::{CollationKey, Collator, Strength};
use super::types::error::{DictError, Result};
use super::types::models::{Article, ArticleHandle, VolumeId};
use super::volume::Volume;
use super::worker::{CancelToken, LookupPool, Ticket};

#[derive(Debug, Clone)]
pub struct CollectionOptions {
    /// Redirects followed before giving up on a chain.
    pub max_redirect_depth: usize,
    /// Strength at which words from different volumes are merged.
    pub strength: Strength,
    pub collator: Arc<Collator>,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            max_redirect_depth: 5,
            strength: Strength::Primary,
            collator: Collator::shared(),
        }
    }
}

/// One collated word and its articles across volumes, in volume order.
#[derive(Debug, Clone)]
pub struct WordLookup {
    pub word: String,
    pub key: CollationKey,
    pub entries: Vec<ArticleHandle>,
}

#[derive(Debug, Default)]
pub struct Collection {
    volumes: Vec<Arc<Volume>>,
    options: CollectionOptions,
}

impl Collection {
    pub fn new(options: CollectionOptions) -> Self {
        Self {
            volumes: Vec::new(),
            options,
        }
    }

    /// Adds a volume unless one with the same identity is present.
    pub fn add(&mut self, volume: impl Into<Arc<Volume>>) -> bool {
        let volume = volume.into();
        if self.get(volume.id()).is_some() {
            debug!("Volume {} already in collection", volume.id());
            return false;
        }
        info!("Collection: added {}", volume.id());
        self.volumes.push(volume);
        true
    }

    pub fn remove(&mut self, id: &VolumeId) -> Option<Arc<Volume>> {
        let index = self.volumes.iter().position(|v| v.id() == id)?;
        Some(self.volumes.remove(index))
    }

    pub fn get(&self, id: &VolumeId) -> Option<&Arc<Volume>> {
        self.volumes.iter().find(|v| v.id() == id)
    }

    pub fn volumes(&self) -> &[Arc<Volume>] {
        &self.volumes
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Volumes grouped by their language code, keeping collection order
    /// inside each group.
    pub fn by_language(&self) -> BTreeMap<String, Vec<Arc<Volume>>> {
        let mut groups: BTreeMap<String, Vec<Arc<Volume>>> = BTreeMap::new();
        for volume in &self.volumes {
            groups
                .entry(volume.language().to_string())
                .or_default()
                .push(volume.clone());
        }
        groups
    }

    /// Matches from every volume in collection order, at most
    /// `max_per_volume` from each.
    pub fn lookup_entries(&self, word: &str, max_per_volume: usize) -> Result<Vec<ArticleHandle>> {
        self.lookup_entries_with(word, max_per_volume, &CancelToken::new())
    }

    fn lookup_entries_with(
        &self,
        word: &str,
        max_per_volume: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<ArticleHandle>> {
        let mut handles = Vec::new();
        for volume in &self.volumes {
            cancel.check()?;
            let mut lookup = match volume.lookup_with(word, cancel.clone()) {
                Ok(lookup) => lookup,
                Err(DictError::Cancelled) => return Err(DictError::Cancelled),
                Err(e) => {
                    warn!("Skipping {} for '{}': {}", volume.id(), word, e);
                    continue;
                }
            };
            handles.extend(
                lookup
                    .by_ref()
                    .take(max_per_volume)
                    .map(|entry| volume.handle(&entry)),
            );
            if matches!(lookup.error(), Some(DictError::Cancelled)) {
                return Err(DictError::Cancelled);
            }
        }
        Ok(handles)
    }

    /// Matches merged across volumes: one [`WordLookup`] per distinct key,
    /// ordered by key.
    pub fn lookup(&self, word: &str, max_per_volume: usize) -> Result<Vec<WordLookup>> {
        self.lookup_with(word, max_per_volume, &CancelToken::new())
    }

    pub fn lookup_with(
        &self,
        word: &str,
        max_per_volume: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<WordLookup>> {
        let handles = self.lookup_entries_with(word, max_per_volume, cancel)?;
        let collator = &self.options.collator;
        let mut keyed: Vec<(CollationKey, ArticleHandle)> = handles
            .into_iter()
            .map(|handle| (collator.key(&handle.title, self.options.strength), handle))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut merged: Vec<WordLookup> = Vec::new();
        for (key, handle) in keyed {
            match merged.last_mut() {
                Some(last) if last.key == key => last.entries.push(handle),
                _ => merged.push(WordLookup {
                    word: handle.title.clone(),
                    key,
                    entries: vec![handle],
                }),
            }
        }
        debug!("'{}': {} merged words", word, merged.len());
        Ok(merged)
    }

    /// Queues a merged lookup on `pool`.
    pub fn submit_lookup(
        self: &Arc<Self>,
        pool: &LookupPool,
        word: &str,
        max_per_volume: usize,
        cancel: CancelToken,
    ) -> Result<Ticket<Vec<WordLookup>>> {
        let collection = Arc::clone(self);
        let word = word.to_string();
        pool.submit(cancel, move |token| {
            collection.lookup_with(&word, max_per_volume, token)
        })
    }

    /// Reads the article behind `handle`, following redirects inside the
    /// same volume.
    ///
    /// A chain that revisits a title or runs longer than the configured
    /// depth stops at the last article read. A redirect whose target does
    /// not exist yields [`Article::not_found`].
    pub fn resolve(&self, handle: &ArticleHandle) -> Result<Article> {
        let volume = self
            .get(&handle.volume)
            .ok_or_else(|| DictError::UnknownVolume(handle.volume.to_string()))?;
        let mut article = volume.read_article(handle)?;
        let mut visited: HashSet<Vec<u8>> = HashSet::new();
        visited.insert(volume.key(&handle.title).as_bytes().to_vec());

        let mut depth = 0;
        while let Some(target) = article.redirect.clone() {
            if depth >= self.options.max_redirect_depth {
                warn!(
                    "Redirect chain from '{}' exceeds {} steps, stopping at '{}'",
                    handle.title, self.options.max_redirect_depth, article.title
                );
                break;
            }
            if !visited.insert(volume.key(&target).as_bytes().to_vec()) {
                warn!("Redirect cycle: '{}' -> '{}' already visited", article.title, target);
                break;
            }
            depth += 1;
            let found = match volume.lookup_exact(&target) {
                Ok(found) => found,
                Err(e) => {
                    warn!("Redirect '{}' -> '{}' lookup failed: {}", article.title, target, e);
                    break;
                }
            };
            let Some(entry) = found.first() else {
                warn!("Redirect target '{}' not found in {}", target, volume.id());
                return Ok(Article::not_found(&target, volume.id().clone()));
            };
            debug!("'{}' redirects to '{}'", article.title, entry.word);
            match volume.read_article(&volume.handle(entry)) {
                Ok(next) => article = next,
                Err(e) => {
                    warn!("Redirect target '{}' unreadable: {}", entry.word, e);
                    break;
                }
            }
        }
        Ok(article)
    }

    /// Closes every volume; the collection keeps them listed.
    pub fn close(&self) -> Result<()> {
        for volume in &self.volumes {
            volume.close()?;
        }
        Ok(())
    }
}
