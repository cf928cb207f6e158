//! Dictionary volume engine.
//!
//! # Module Organization
//!
//! - [`types`]: errors and shared data structures
//! - [`collation`]: collation keys and tables
//! - [`codec`]: article codecs and the fallback chain
//! - [`format`]: header and payload parsing
//! - [`index`]: long index readers and the short index
//! - [`store`]: article records across files
//! - [`volume`]: one opened dictionary
//! - [`lookup`] / [`verify`]: cursors over a volume
//! - [`collection`]: volumes queried together, redirect resolution
//! - [`worker`]: bounded worker pool and cancellation
//! - [`compiler`]: offline volume builder
//! - [`text`]: rendering helpers for callers
//!
//! # Lookup flow
//!
//! ```text
//! Collection::lookup(word)
//!     │
//!     ├─► Volume::lookup ──► ShortIndex::start ──► candidate positions
//!     │                           │
//!     │                           ▼
//!     │                      LongIndex (linked walk / array binary search)
//!     │                           │
//!     │                           ▼
//!     │                      IndexEntry { word, article pointer }
//!     │
//!     └─► merge by collation key ──► WordLookup { ArticleHandle, .. }
//!                                         │
//!                     Collection::resolve ▼
//!                      ArticleStore ──► CodecChain ──► Article
//! ```

pub mod cache;
pub mod codec;
pub mod collation;
pub mod collection;
pub mod compiler;
pub mod format;
pub mod index;
pub mod lookup;
pub mod store;
pub mod text;
pub mod types;
pub mod utils;
pub mod verify;
pub mod volume;
pub mod worker;

pub use cache::CacheStats;
pub use codec::CodecChain;
pub use collation::{CollationKey, Collator, Strength};
pub use collection::{Collection, CollectionOptions, WordLookup};
pub use compiler::{BuildReport, SourceEntry, VolumeBuilder};
pub use index::IndexOrigin;
pub use lookup::Lookup;
pub use types::error::{DictError, Result};
pub use types::models::*;
pub use verify::Verify;
pub use volume::{OpenOptions, Volume, VolumeState};
pub use worker::{CancelToken, LookupPool, Ticket};
