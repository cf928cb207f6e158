//! File format parsing layer for volume files.
//!
//! # Module Organization
//!
//! - [`header`]: signature, version token and the metadata block
//! - [`content`]: article payload decoding
//!
//! # Architecture
//!
//! ```text
//! File Structure:
//! ┌──────────────────────┐
//! │  Signature + token   │ ← header::parse()
//! │  Metadata (JSON)     │
//! ├──────────────────────┤
//! │  Short index table   │ ← index::short (optional)
//! ├──────────────────────┤
//! │  Long index          │ ← index::linked / index::array
//! │  (+ words region)    │
//! ├──────────────────────┤
//! │  Article records     │ ← store, content::decode_payload()
//! └──────────────────────┘
//! ```

pub mod content;
pub mod header;
