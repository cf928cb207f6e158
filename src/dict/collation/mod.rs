//! Locale-aware collation keys.
//!
//! Words are compared through byte keys built from collation elements.
//! Each element carries up to four weights; a key for strength `k` lists
//! the non-zero weights of level 1, then level 2, and so on up to `k`,
//! with a `0x0000` separator between levels. Comparing two keys with
//! plain byte ordering therefore compares primary weights first, which is
//! what lets a long index sorted at the finest strength be searched at
//! any coarser one.
//!
//! Two element sources are available:
//! - [`Collator::builtin`]: derives elements from the NFD form of the text
//!   (base letter, accents, case), good enough for alphabetic scripts.
//! - [`Collator::from_table`]: a DUCET-style table loaded into a trie, see
//!   [`table`].

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::types::error::Result;

pub mod table;

pub use table::CollationTable;

/// Comparison strength, coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strength {
    /// Base letters only.
    Primary,
    /// Adds accents.
    Secondary,
    /// Adds case.
    Tertiary,
    /// Adds punctuation and whitespace.
    Quaternary,
}

impl Strength {
    pub fn levels(&self) -> usize {
        match self {
            Strength::Primary => 1,
            Strength::Secondary => 2,
            Strength::Tertiary => 3,
            Strength::Quaternary => 4,
        }
    }
}

/// One collation element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollationElement {
    pub primary: u16,
    pub secondary: u16,
    pub tertiary: u16,
    /// Explicit fourth weight; derived from the other weights when absent.
    pub quaternary: Option<u16>,
    /// Variable elements (spaces, punctuation) only count at the fourth level.
    pub variable: bool,
}

impl CollationElement {
    pub const fn new(primary: u16, secondary: u16, tertiary: u16) -> Self {
        Self {
            primary,
            secondary,
            tertiary,
            quaternary: None,
            variable: false,
        }
    }

    /// Weight at `level` (0-based) using shifted handling of variable elements.
    fn weight(&self, level: usize) -> u16 {
        if self.variable {
            return match level {
                3 => self.quaternary.unwrap_or(self.primary),
                _ => 0,
            };
        }
        match level {
            0 => self.primary,
            1 => self.secondary,
            2 => self.tertiary,
            _ => match self.quaternary {
                Some(q) => q,
                None if self.primary != 0 || self.secondary != 0 || self.tertiary != 0 => 0xFFFF,
                None => 0,
            },
        }
    }
}

/// UCA implicit weights for code points without an explicit mapping.
pub(crate) fn implicit_elements(cp: u32) -> [CollationElement; 2] {
    let base = if (0x4E00..=0x9FFF).contains(&cp) || (0xF900..=0xFAFF).contains(&cp) {
        0xFB40
    } else {
        0xFBC0
    };
    let aaaa = (base + (cp >> 15)) as u16;
    let bbbb = ((cp & 0x7FFF) | 0x8000) as u16;
    [
        CollationElement::new(aaaa, 0x0020, 0x0002),
        CollationElement::new(bbbb, 0, 0),
    ]
}

/// A comparable byte key for a string at a given strength.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollationKey {
    bytes: Vec<u8>,
    strength: Strength,
}

impl CollationKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn strength(&self) -> Strength {
        self.strength
    }

    pub fn is_empty(&self) -> bool {
        self.primary_weights().is_empty()
    }

    /// Level-one weights as raw bytes (two bytes per weight).
    pub fn primary_weights(&self) -> &[u8] {
        self.levels().next().unwrap_or(&[])
    }

    /// Number of primary weights in this key.
    pub fn primary_len(&self) -> usize {
        self.primary_weights().len() / 2
    }

    fn levels(&self) -> impl Iterator<Item = &[u8]> {
        LevelSplit {
            rest: Some(&self.bytes),
        }
    }

    /// Returns true when `prefix` collates as a leading part of `self`.
    ///
    /// At primary strength this is a plain byte-prefix test. At finer
    /// strengths every level of `prefix` must be a prefix of the same level
    /// of `self`.
    pub fn starts_with(&self, prefix: &CollationKey) -> bool {
        if self.strength == Strength::Primary && prefix.strength == Strength::Primary {
            return self.bytes.starts_with(&prefix.bytes);
        }
        let mut own = self.levels();
        for level in prefix.levels() {
            match own.next() {
                Some(mine) if mine.starts_with(level) => {}
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Debug for CollationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CollationKey({:?}, {})", self.strength, hex::encode(&self.bytes))
    }
}

/// Splits key bytes on aligned `0x0000` level separators.
struct LevelSplit<'a> {
    rest: Option<&'a [u8]>,
}

impl<'a> Iterator for LevelSplit<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let rest = self.rest?;
        let sep = rest
            .chunks(2)
            .position(|w| w == [0, 0])
            .map(|i| i * 2);
        match sep {
            Some(at) => {
                self.rest = Some(&rest[at + 2..]);
                Some(&rest[..at])
            }
            None => {
                self.rest = None;
                Some(rest)
            }
        }
    }
}

#[derive(Debug)]
enum Source {
    Builtin,
    Table(CollationTable),
}

/// Builds collation keys. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Collator {
    source: Source,
}

static SHARED: OnceLock<Arc<Collator>> = OnceLock::new();

impl Collator {
    pub fn builtin() -> Self {
        Self {
            source: Source::Builtin,
        }
    }

    /// The process-wide built-in collator.
    pub fn shared() -> Arc<Collator> {
        SHARED.get_or_init(|| Arc::new(Collator::builtin())).clone()
    }

    pub fn from_table(table: CollationTable) -> Self {
        Self {
            source: Source::Table(table),
        }
    }

    /// Loads a collation table file.
    pub fn load_table(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_table(CollationTable::load(path)?))
    }

    /// Identifies the element source; persisted next to derived data so that
    /// data built with another table is not reused.
    pub fn fingerprint(&self) -> u64 {
        match &self.source {
            Source::Builtin => 0,
            Source::Table(table) => table.fingerprint(),
        }
    }

    /// Collation elements of the NFD form of `s`.
    pub fn elements(&self, s: &str) -> Vec<CollationElement> {
        let chars: Vec<char> = s.nfd().collect();
        match &self.source {
            Source::Builtin => builtin_elements(&chars),
            Source::Table(table) => table.elements(&chars),
        }
    }

    pub fn key(&self, s: &str, strength: Strength) -> CollationKey {
        let elements = self.elements(s);
        let mut bytes = Vec::with_capacity(elements.len() * 2 * strength.levels());
        for level in 0..strength.levels() {
            if level > 0 {
                bytes.extend_from_slice(&[0, 0]);
            }
            for element in &elements {
                let w = element.weight(level);
                if w != 0 {
                    bytes.extend_from_slice(&w.to_be_bytes());
                }
            }
        }
        CollationKey { bytes, strength }
    }

    pub fn compare(&self, a: &str, b: &str, strength: Strength) -> Ordering {
        self.key(a, strength).cmp(&self.key(b, strength))
    }
}

fn is_variable(c: char) -> bool {
    c.is_whitespace()
        || c.is_ascii_punctuation()
        || matches!(c, '\u{00A1}'..='\u{00BF}' | '\u{2000}'..='\u{206F}' | '\u{3000}'..='\u{303F}')
}

fn builtin_elements(chars: &[char]) -> Vec<CollationElement> {
    let mut out = Vec::with_capacity(chars.len());
    for &c in chars {
        let cp = c as u32;
        if is_combining_mark(c) {
            let secondary = (0x0021 + (cp & 0x7FFF)) as u16;
            out.push(CollationElement::new(0, secondary, 0x0002));
        } else if c.is_control() {
            continue;
        } else if is_variable(c) {
            out.push(CollationElement {
                primary: (0x0200 + (cp & 0x0FFF)) as u16,
                secondary: 0x0020,
                tertiary: 0x0002,
                quaternary: None,
                variable: true,
            });
        } else {
            let lower = c.to_lowercase().next().unwrap_or(c);
            let tertiary = if lower != c { 0x0008 } else { 0x0002 };
            let lcp = lower as u32;
            if lcp < 0xE000 {
                out.push(CollationElement::new((0x1000 + lcp) as u16, 0x0020, tertiary));
            } else {
                let [mut first, second] = implicit_elements(lcp);
                first.tertiary = tertiary;
                out.push(first);
                out.push(second);
            }
        }
    }
    out
}
