//! Codec layer for article compression.
//!
//! # Submodules
//!
//! - [`compression`][]: per-codec (de)compression and the fallback [`compression::CodecChain`]

pub mod compression;

pub use compression::CodecChain;
