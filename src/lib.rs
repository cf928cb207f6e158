//! # lexivol
//!
//! Storage and lookup engine for indexed dictionary volumes: collated
//! prefix search over linked or fixed-stride indexes, compressed articles
//! spread over one or more files, and redirect resolution across a
//! collection of volumes.
pub mod dict;

// Re-export the main types for convenience
pub use dict::{
    ArticleHandle, CancelToken, Collection, Collator, DictError, LookupPool, OpenOptions, Result,
    Strength, Volume, VolumeBuilder,
    types::models::{Article, ArticlePointer, Codec, FormatVersion, IndexEntry, Tag, VolumeId},
};
