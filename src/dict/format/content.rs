//! # Article Payload Decoding
//!
//! A decompressed article record is a JSON array:
//!
//! ```text
//! [text, tags]            or            [text, tags, meta]
//! tag  = [name, start, end]  |  [name, start, end, {attr: value, ...}]
//! meta = {"r": "<redirect target>"}
//! ```
//!
//! Tag offsets are returned exactly as stored. Known bad offsets (note
//! tags in particular) are a rendering concern, see [`crate::dict::text`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::dict::types::error::{DictError, Result};
use crate::dict::types::models::{AttrValue, Tag};

/// Text prefix marking a body that only redirects elsewhere.
pub const LINK_PREFIX: &str = "@@@LINK=";

/// Decoded article contents, before the volume attaches title and identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub text: String,
    pub tags: Vec<Tag>,
    pub redirect: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTag {
    WithAttrs(String, usize, usize, Option<BTreeMap<String, AttrValue>>),
    Bare(String, usize, usize),
}

#[derive(Deserialize, Default)]
struct RawMeta {
    #[serde(default)]
    r: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPayload {
    WithMeta(String, Vec<RawTag>, Option<RawMeta>),
    Bare(String, Vec<RawTag>),
}

impl From<RawTag> for Tag {
    fn from(raw: RawTag) -> Self {
        let (name, start, end, attributes) = match raw {
            RawTag::WithAttrs(name, start, end, attrs) => (name, start, end, attrs.unwrap_or_default()),
            RawTag::Bare(name, start, end) => (name, start, end, BTreeMap::new()),
        };
        Tag {
            name,
            start,
            end,
            attributes,
        }
    }
}

/// Parses a decompressed payload.
pub fn decode_payload(bytes: &[u8]) -> Result<Payload> {
    let raw: RawPayload = serde_json::from_slice(bytes)
        .map_err(|e| DictError::InvalidFormat(format!("Not an article payload: {}", e)))?;
    let (text, tags, meta) = match raw {
        RawPayload::WithMeta(text, tags, meta) => (text, tags, meta.unwrap_or_default()),
        RawPayload::Bare(text, tags) => (text, tags, RawMeta::default()),
    };

    let redirect = meta
        .r
        .filter(|target| !target.is_empty())
        .or_else(|| link_target(&text));

    Ok(Payload {
        text,
        tags: tags.into_iter().map(Tag::from).collect(),
        redirect,
    })
}

/// Payload for bytes no codec could decode: the raw bytes as text.
pub fn raw_payload(bytes: &[u8]) -> Payload {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let redirect = link_target(&text);
    Payload {
        text,
        tags: Vec::new(),
        redirect,
    }
}

fn link_target(text: &str) -> Option<String> {
    text.strip_prefix(LINK_PREFIX)
        .map(|target| target.trim_end_matches(['\0', '\r', '\n', ' ']).to_string())
        .filter(|target| !target.is_empty())
}

/// Serializes a payload. Used by the offline compiler.
pub fn encode_payload(text: &str, tags: &[Tag], redirect: Option<&str>) -> Result<Vec<u8>> {
    let tags: Vec<Value> = tags
        .iter()
        .map(|tag| {
            if tag.attributes.is_empty() {
                json!([tag.name, tag.start, tag.end])
            } else {
                json!([tag.name, tag.start, tag.end, tag.attributes])
            }
        })
        .collect();
    let value = match redirect {
        Some(target) => json!([text, tags, { "r": target }]),
        None => json!([text, tags]),
    };
    Ok(serde_json::to_vec(&value)?)
}
