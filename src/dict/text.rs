//! Helpers for callers that render article text by character ranges.
//!
//! The storage layer returns tag offsets exactly as stored. Source data is
//! known to carry `note` tags whose end runs past the line they belong to;
//! a renderer that wants the usual reading clamps them with
//! [`clamp_note_end`].

use crate::dict::types::models::Tag;

pub const NOTE_TAG: &str = "note";

/// End offset for `tag` when rendering `text`.
///
/// For a `note` tag the end is cut at the first line break at or after the
/// tag start. Other tags, and notes that already end before a line break,
/// keep their stored end. Offsets count characters.
pub fn clamp_note_end(text: &str, tag: &Tag) -> usize {
    if tag.name != NOTE_TAG {
        return tag.end;
    }
    match text.chars().skip(tag.start).position(|c| c == '\n') {
        Some(offset) => tag.end.min(tag.start + offset),
        None => tag.end,
    }
}

/// Copies `tags` with every note end clamped.
pub fn clamped_tags(text: &str, tags: &[Tag]) -> Vec<Tag> {
    tags.iter()
        .map(|tag| Tag {
            end: clamp_note_end(text, tag),
            ..tag.clone()
        })
        .collect()
}
