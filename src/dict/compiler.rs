//! Offline compiler: builds volume files from source entries.
//!
//! Source text is a sequence of blocks:
//!
//! ```text
//! headword
//! article line
//! article line
//! </>
//! ```
//!
//! An article consisting of `@@@LINK=target` is stored as a redirect.
//!
//! Entries are sorted by their quaternary collation key before writing, so
//! every strength sees a non-decreasing order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use super::codec::compression;
use super::collation::{Collator, Strength};
use super::format::content::{self, LINK_PREFIX};
use super::format::header::{self, Metadata};
use super::index::{array, linked};
use super::types::error::{DictError, Result};
use super::types::models::{ArticlePointer, Codec, FormatVersion, Tag};
use super::volume::sibling_path;

/// Line that ends an article block in source text.
pub const ENTRY_TERMINATOR: &str = "</>";

/// Cap on the headword prefix depth of an eager short-index table.
const MAX_SHORT_TABLE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    pub word: String,
    pub text: String,
    pub tags: Vec<Tag>,
    pub redirect: Option<String>,
}

impl SourceEntry {
    pub fn new(word: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let redirect = text
            .strip_prefix(LINK_PREFIX)
            .map(|target| target.trim().to_string())
            .filter(|target| !target.is_empty());
        Self {
            word: word.into(),
            text,
            tags: Vec::new(),
            redirect,
        }
    }

    pub fn redirect(word: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            word: word.into(),
            text: format!("{}{}", LINK_PREFIX, target),
            tags: Vec::new(),
            redirect: Some(target),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }
}

/// Parses `headword / lines / </>` blocks. Blank lines between blocks are
/// skipped; a block left open at the end of input is an error.
pub fn parse_source(text: &str) -> Result<Vec<SourceEntry>> {
    let mut entries = Vec::new();
    let mut lines = text.lines().enumerate();
    while let Some((line_no, word)) = lines.next() {
        let word = word.trim_end_matches('\r');
        if word.trim().is_empty() {
            continue;
        }
        let mut body: Vec<&str> = Vec::new();
        let mut closed = false;
        for (_, line) in lines.by_ref() {
            let line = line.trim_end_matches('\r');
            if line.trim() == ENTRY_TERMINATOR {
                closed = true;
                break;
            }
            body.push(line);
        }
        if !closed {
            return Err(DictError::InvalidFormat(format!(
                "entry '{}' starting at line {} has no '{}'",
                word,
                line_no + 1,
                ENTRY_TERMINATOR
            )));
        }
        entries.push(SourceEntry::new(word, body.join("\n")));
    }
    Ok(entries)
}

/// What [`VolumeBuilder::write`] produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Primary file first.
    pub files: Vec<PathBuf>,
    /// Headwords in index order with their article pointers.
    pub entries: Vec<(String, ArticlePointer)>,
}

#[derive(Debug, Clone)]
pub struct VolumeBuilder {
    title: String,
    version: String,
    language: String,
    description: Option<String>,
    copyright: Option<String>,
    timestamp: Option<u64>,
    format: FormatVersion,
    codec: Codec,
    files: usize,
    short_index_depth: Option<usize>,
    collator: Arc<Collator>,
    entries: Vec<SourceEntry>,
}

impl VolumeBuilder {
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            language: String::new(),
            description: None,
            copyright: None,
            timestamp: None,
            format: FormatVersion::FixedRecord,
            codec: Codec::Zlib,
            files: 1,
            short_index_depth: None,
            collator: Collator::shared(),
            entries: Vec::new(),
        }
    }

    pub fn format(mut self, format: FormatVersion) -> Self {
        self.format = format;
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn copyright(mut self, copyright: impl Into<String>) -> Self {
        self.copyright = Some(copyright.into());
        self
    }

    /// Build timestamp shared by every file; defaults to the current time.
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Spreads the article region over `files` files.
    pub fn files(mut self, files: usize) -> Self {
        self.files = files.max(1);
        self
    }

    /// Stores an eager short-index table with prefixes up to `depth` weights.
    pub fn short_index_depth(mut self, depth: usize) -> Self {
        self.short_index_depth = Some(depth.clamp(1, MAX_SHORT_TABLE_DEPTH));
        self
    }

    pub fn collator(mut self, collator: Arc<Collator>) -> Self {
        self.collator = collator;
        self
    }

    pub fn entry(mut self, entry: SourceEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn add(mut self, word: impl Into<String>, text: impl Into<String>) -> Self {
        self.entries.push(SourceEntry::new(word, text));
        self
    }

    pub fn add_redirect(mut self, word: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.push(SourceEntry::redirect(word, target));
        self
    }

    pub fn extend(mut self, entries: impl IntoIterator<Item = SourceEntry>) -> Self {
        self.entries.extend(entries);
        self
    }

    /// Writes the primary file at `path` and any siblings next to it.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<BuildReport> {
        let path = path.as_ref();
        info!(
            "Compiling '{}' {}: {} entries, {} format, codec {}, {} file(s)",
            self.title,
            self.version,
            self.entries.len(),
            self.format,
            self.codec,
            self.files
        );

        let mut sorted: Vec<(Vec<u8>, &SourceEntry)> = self
            .entries
            .iter()
            .map(|e| (self.collator.key(&e.word, Strength::Quaternary).as_bytes().to_vec(), e))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let sorted: Vec<&SourceEntry> = sorted.into_iter().map(|(_, e)| e).collect();

        let timestamp = self.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });

        // Article regions, one per file.
        let file_count = self.files.min(sorted.len().max(1));
        let mut regions: Vec<Vec<u8>> = vec![Vec::new(); file_count];
        let mut bases = vec![0u64; file_count];
        let mut pointers = Vec::with_capacity(sorted.len());
        for (i, entry) in sorted.iter().enumerate() {
            let file_no = i * file_count / sorted.len().max(1);
            if file_no > 0 && bases[file_no] == 0 && regions[file_no].is_empty() {
                bases[file_no] = bases[file_no - 1] + regions[file_no - 1].len() as u64;
            }
            let payload = content::encode_payload(&entry.text, &entry.tags, entry.redirect.as_deref())?;
            let compressed = compression::compress(self.codec, &payload)?;
            let region = &mut regions[file_no];
            let local = region.len() as u64;
            region.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
            region.extend_from_slice(&compressed);
            let pointer = match self.format {
                FormatVersion::FixedRecord => ArticlePointer::Local {
                    file_no: file_no as u32,
                    offset: local,
                },
                _ => ArticlePointer::Global(bases[file_no] + local),
            };
            pointers.push(pointer);
        }

        // Long index, plus the words region for array formats.
        let mut index = Vec::new();
        let mut words = Vec::new();
        let mut positions = Vec::with_capacity(sorted.len());
        match self.format {
            FormatVersion::Linked => {
                let lens: Vec<u64> = sorted
                    .iter()
                    .map(|e| linked::record_len(e.word.len()))
                    .collect();
                for (i, entry) in sorted.iter().enumerate() {
                    positions.push(index.len() as u64);
                    let next = if i + 1 < sorted.len() { lens[i] } else { 0 };
                    let prev = if i > 0 { lens[i - 1] } else { 0 };
                    let ArticlePointer::Global(article) = pointers[i] else {
                        return Err(DictError::InvalidFormat(
                            "linked index needs global article pointers".to_string(),
                        ));
                    };
                    index.extend(linked::encode_record(
                        to_u32(next, "record length")?,
                        to_u32(prev, "record length")?,
                        word_bytes(&entry.word)?,
                        article,
                    ));
                }
            }
            FormatVersion::Positional | FormatVersion::FixedRecord => {
                for (i, entry) in sorted.iter().enumerate() {
                    positions.push(i as u64);
                    let word_ptr = to_u32(words.len() as u64, "words region")?;
                    let bytes = word_bytes(&entry.word)?;
                    words.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    words.extend_from_slice(bytes);
                    let record = match pointers[i] {
                        ArticlePointer::Global(article) => array::encode_positional(word_ptr, article),
                        ArticlePointer::Local { file_no, offset } => {
                            array::encode_fixed(word_ptr, file_no, to_u32(offset, "article offset")?)
                        }
                    };
                    index.extend_from_slice(&record);
                }
            }
        }

        let short_table = match self.short_index_depth {
            Some(depth) => Some(self.short_table(&sorted, &positions, depth)),
            None => None,
        };

        // Primary file.
        let mut meta = Metadata {
            title: self.title.clone(),
            version: self.version.clone(),
            language: self.language.clone(),
            copyright: self.copyright.clone(),
            description: self.description.clone(),
            license: None,
            encoding: None,
            compression: Some(self.codec.name().to_string()),
            timestamp,
            file_count: file_count as u64,
            file_no: 0,
            article_base: 0,
            article_offset: 0,
            article_count: Some(sorted.len() as u64),
            index_offset: Some(0),
            index_count: Some(sorted.len() as u64),
            words_offset: self.format.is_array().then_some(0),
            short_index_offset: None,
            short_index_count: None,
            short_index_depth: None,
        };
        if let Some((depth, table)) = &short_table {
            meta.short_index_count = Some((table.len() / (depth * 4 + 8)) as u64);
            meta.short_index_depth = Some(*depth as u64);
            meta.short_index_offset = Some(0);
        }
        let short_len = short_table.as_ref().map_or(0, |(_, t)| t.len() as u64);
        let header_bytes = settle_header(self.format, &mut meta, |meta, header_len| {
            if meta.short_index_offset.is_some() {
                meta.short_index_offset = Some(header_len);
            }
            let index_offset = header_len + short_len;
            meta.index_offset = Some(index_offset);
            if meta.words_offset.is_some() {
                meta.words_offset = Some(index_offset + index.len() as u64);
            }
            meta.article_offset = index_offset + index.len() as u64 + words.len() as u64;
        })?;

        let mut primary = header_bytes;
        if let Some((_, table)) = &short_table {
            primary.extend_from_slice(table);
        }
        primary.extend_from_slice(&index);
        primary.extend_from_slice(&words);
        primary.extend_from_slice(&regions[0]);
        fs::write(path, &primary)?;
        debug!("Wrote {} ({} bytes)", path.display(), primary.len());

        let mut files = vec![path.to_path_buf()];
        for k in 1..file_count {
            let mut sibling = Metadata {
                file_no: k as u64,
                article_base: bases[k],
                article_count: None,
                index_offset: None,
                index_count: None,
                words_offset: None,
                short_index_offset: None,
                short_index_count: None,
                short_index_depth: None,
                ..meta.clone()
            };
            let mut bytes = settle_header(self.format, &mut sibling, |meta, header_len| {
                meta.article_offset = header_len;
            })?;
            bytes.extend_from_slice(&regions[k]);
            let sibling_file = sibling_path(path, (k - 1) as u64);
            fs::write(&sibling_file, &bytes)?;
            debug!("Wrote {} ({} bytes)", sibling_file.display(), bytes.len());
            files.push(sibling_file);
        }

        info!("Compiled '{}' into {} file(s)", self.title, files.len());
        Ok(BuildReport {
            files,
            entries: sorted
                .iter()
                .zip(pointers)
                .map(|(e, p)| (e.word.clone(), p))
                .collect(),
        })
    }

    /// Eager table: every distinct primary-weight prefix up to `depth`
    /// weights that some run of headword characters reproduces, with the
    /// position of the first record carrying it.
    fn short_table(&self, sorted: &[&SourceEntry], positions: &[u64], depth: usize) -> (usize, Vec<u8>) {
        let mut seen = std::collections::HashSet::new();
        let mut table = Vec::new();
        for (entry, &position) in sorted.iter().zip(positions) {
            let key = self.collator.key(&entry.word, Strength::Primary);
            let weights = key.primary_weights();
            // Characters without primary weights never help reproduce a prefix.
            let chars: Vec<char> = entry
                .word
                .chars()
                .filter(|c| !self.collator.key(&c.to_string(), Strength::Primary).is_empty())
                .collect();
            for n in 1..=depth.min(weights.len() / 2) {
                let prefix = &weights[..n * 2];
                if seen.contains(prefix) {
                    continue;
                }
                let shortest = (1..=chars.len().min(depth)).find_map(|c| {
                    let candidate: String = chars[..c].iter().collect();
                    let key = self.collator.key(&candidate, Strength::Primary);
                    (key.primary_weights() == prefix).then_some(candidate)
                });
                let Some(candidate) = shortest else {
                    continue;
                };
                seen.insert(prefix.to_vec());
                let mut padded = [0u32; MAX_SHORT_TABLE_DEPTH];
                for (slot, c) in padded.iter_mut().zip(candidate.chars()) {
                    *slot = c as u32;
                }
                for cp in &padded[..depth] {
                    table.extend_from_slice(&cp.to_be_bytes());
                }
                table.extend_from_slice(&position.to_be_bytes());
            }
        }
        debug!("Eager short table: {} prefixes at depth {}", seen.len(), depth);
        (depth, table)
    }
}

/// Encodes the header, re-running `place` until the header length it
/// assumes matches the encoded one.
fn settle_header(
    format: FormatVersion,
    meta: &mut Metadata,
    mut place: impl FnMut(&mut Metadata, u64),
) -> Result<Vec<u8>> {
    let mut header_len = header::encoded_len(meta)?;
    for _ in 0..8 {
        place(meta, header_len);
        let encoded = header::encode(format, meta)?;
        if encoded.len() as u64 == header_len {
            return Ok(encoded);
        }
        header_len = encoded.len() as u64;
    }
    Err(DictError::InvalidFormat("header length did not settle".to_string()))
}

fn word_bytes(word: &str) -> Result<&[u8]> {
    if word.len() > u16::MAX as usize {
        return Err(DictError::InvalidFormat(format!(
            "headword of {} bytes is too long",
            word.len()
        )));
    }
    Ok(word.as_bytes())
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| DictError::InvalidFormat(format!("{} exceeds 4 GiB", what)))
}
