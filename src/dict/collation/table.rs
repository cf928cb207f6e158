//! Table-driven collation elements.
//!
//! Parses a DUCET-style text table:
//!
//! ```text
//! @version 9.0.0
//! 0061      ; [.1C47.0020.0002]              # LATIN SMALL LETTER A
//! 0063 0068 ; [.1C7A.0020.0002]              # contraction
//! 00E6      ; [.1C47.0020.0004][.0000.0110.0004][.1CAA.0020.0004]
//! 0020      ; [*0209.0020.0002]              # SPACE (variable)
//! ```
//!
//! Mappings are stored in a trie keyed by code points and matched
//! longest-prefix first. Code points without a mapping get implicit weights.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use twox_hash::XxHash64;

use super::{CollationElement, implicit_elements};
use crate::dict::types::error::{DictError, Result};

#[derive(Debug, Default)]
struct TrieNode {
    elements: Option<Vec<CollationElement>>,
    children: HashMap<char, TrieNode>,
}

/// A parsed collation-element table.
#[derive(Debug)]
pub struct CollationTable {
    root: TrieNode,
    mappings: usize,
    fingerprint: u64,
}

impl CollationTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading collation table: {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut root = TrieNode::default();
        let mut mappings = 0usize;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() || line.starts_with('@') {
                continue;
            }
            let (lhs, rhs) = line.split_once(';').ok_or_else(|| DictError::Collation {
                line: line_no,
                reason: "missing ';'".to_string(),
            })?;

            let chars = parse_code_points(lhs, line_no)?;
            let elements = parse_elements(rhs, line_no)?;

            let mut node = &mut root;
            for c in chars {
                node = node.children.entry(c).or_default();
            }
            node.elements = Some(elements);
            mappings += 1;
        }

        debug!("Collation table parsed: {} mappings", mappings);
        Ok(Self {
            root,
            mappings,
            fingerprint: XxHash64::oneshot(0, text.as_bytes()),
        })
    }

    pub fn len(&self) -> usize {
        self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings == 0
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Maps a code point sequence to collation elements.
    pub fn elements(&self, chars: &[char]) -> Vec<CollationElement> {
        let mut out = Vec::with_capacity(chars.len());
        let mut i = 0;
        while i < chars.len() {
            match self.longest_match(&chars[i..]) {
                Some((consumed, elements)) => {
                    out.extend_from_slice(elements);
                    i += consumed;
                }
                None => {
                    out.extend_from_slice(&implicit_elements(chars[i] as u32));
                    i += 1;
                }
            }
        }
        out
    }

    fn longest_match(&self, chars: &[char]) -> Option<(usize, &[CollationElement])> {
        let mut node = &self.root;
        let mut best = None;
        for (depth, c) in chars.iter().enumerate() {
            match node.children.get(c) {
                Some(child) => {
                    node = child;
                    if let Some(elements) = &node.elements {
                        best = Some((depth + 1, elements.as_slice()));
                    }
                }
                None => break,
            }
        }
        best
    }
}

fn parse_code_points(field: &str, line: usize) -> Result<Vec<char>> {
    let chars = field
        .split_whitespace()
        .map(|hex| {
            u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| DictError::Collation {
                    line,
                    reason: format!("bad code point '{}'", hex),
                })
        })
        .collect::<Result<Vec<char>>>()?;
    if chars.is_empty() {
        return Err(DictError::Collation {
            line,
            reason: "empty code point sequence".to_string(),
        });
    }
    Ok(chars)
}

fn parse_elements(field: &str, line: usize) -> Result<Vec<CollationElement>> {
    let mut elements = Vec::new();
    let mut rest = field.trim();
    while let Some(start) = rest.find('[') {
        let end = rest[start..].find(']').ok_or_else(|| DictError::Collation {
            line,
            reason: "unterminated element".to_string(),
        })? + start;
        elements.push(parse_element(&rest[start + 1..end], line)?);
        rest = &rest[end + 1..];
    }
    if elements.is_empty() {
        return Err(DictError::Collation {
            line,
            reason: "no collation elements".to_string(),
        });
    }
    Ok(elements)
}

/// Parses `.1C47.0020.0002` or `*0209.0020.0002` (optionally with a fourth weight).
fn parse_element(body: &str, line: usize) -> Result<CollationElement> {
    let variable = body.starts_with('*');
    let weights = body
        .trim_start_matches(['.', '*'])
        .split(['.', '*'])
        .map(|w| {
            u16::from_str_radix(w, 16).map_err(|_| DictError::Collation {
                line,
                reason: format!("bad weight '{}'", w),
            })
        })
        .collect::<Result<Vec<u16>>>()?;
    if !(3..=4).contains(&weights.len()) {
        return Err(DictError::Collation {
            line,
            reason: format!("expected 3 or 4 weights, found {}", weights.len()),
        });
    }
    Ok(CollationElement {
        primary: weights[0],
        secondary: weights[1],
        tertiary: weights[2],
        quaternary: weights.get(3).copied(),
        variable,
    })
}
