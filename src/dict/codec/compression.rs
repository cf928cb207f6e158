//! Decompression algorithms for article records.
//!
//! Volumes support multiple compression formats:
//! - `none`: stored as-is
//! - `zlib`: deflate with zlib framing via flate2
//! - `lzo`: LZO1X via lzokay
//!
//! Format revisions in the wild disagree on which codec a record used, so
//! records are decoded by trying codecs in order until one yields a payload
//! the caller accepts.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use log::{debug, trace};
use lzokay::decompress::decompress as lzokay_decompress;

use crate::dict::types::error::{DictError, Result};
use crate::dict::types::models::Codec;

/// Upper bound for a single decompressed article.
pub const MAX_ARTICLE_LEN: usize = 64 * 1024 * 1024;

/// Decompresses `payload` with one codec.
pub fn decompress(codec: Codec, payload: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(payload.to_vec()),
        Codec::Zlib => {
            let mut output = Vec::with_capacity(payload.len() * 3);
            ZlibDecoder::new(payload)
                .take(MAX_ARTICLE_LEN as u64 + 1)
                .read_to_end(&mut output)
                .map_err(|e| DictError::InvalidFormat(format!("Zlib decompression failed: {}", e)))?;
            if output.len() > MAX_ARTICLE_LEN {
                return Err(DictError::InvalidFormat("Zlib output too large".to_string()));
            }
            Ok(output)
        }
        Codec::Lzo => {
            // LZO streams do not record their decompressed size; grow until it fits.
            let mut capacity = (payload.len() * 4).max(256);
            loop {
                let mut output = vec![0u8; capacity];
                match lzokay_decompress(payload, &mut output) {
                    Ok(written) => {
                        output.truncate(written);
                        return Ok(output);
                    }
                    Err(lzokay::Error::OutputOverrun) if capacity < MAX_ARTICLE_LEN => {
                        trace!("LZO output overrun at {} bytes, growing", capacity);
                        capacity *= 2;
                    }
                    Err(e) => {
                        return Err(DictError::InvalidFormat(format!(
                            "LZO decompression failed: {}",
                            e
                        )));
                    }
                }
            }
        }
    }
}

/// Compresses `payload` with one codec. Used by the offline compiler.
pub fn compress(codec: Codec, payload: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::None => Ok(payload.to_vec()),
        Codec::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            Ok(encoder.finish()?)
        }
        Codec::Lzo => lzokay::compress::compress(payload)
            .map_err(|e| DictError::InvalidFormat(format!("LZO compression failed: {}", e))),
    }
}

/// Ordered list of codecs tried when decoding a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecChain {
    order: Vec<Codec>,
}

impl Default for CodecChain {
    fn default() -> Self {
        Self::new(Codec::ALL.to_vec())
    }
}

impl CodecChain {
    /// Builds a chain from `order`, dropping repeats and appending any codec
    /// the order left out.
    pub fn new(order: Vec<Codec>) -> Self {
        let mut deduped: Vec<Codec> = Vec::with_capacity(Codec::ALL.len());
        for codec in order.into_iter().chain(Codec::ALL) {
            if !deduped.contains(&codec) {
                deduped.push(codec);
            }
        }
        Self { order: deduped }
    }

    /// The default order with `hint` moved to the front.
    pub fn with_preferred(hint: Option<Codec>) -> Self {
        match hint {
            Some(codec) => Self::new(vec![codec]),
            None => Self::default(),
        }
    }

    pub fn order(&self) -> &[Codec] {
        &self.order
    }

    /// Tries every codec in order and returns the first output `accept`
    /// turns into a value, with the codec that produced it.
    pub fn decode<T>(
        &self,
        raw: &[u8],
        mut accept: impl FnMut(&[u8]) -> Result<T>,
    ) -> Option<(T, Codec)> {
        for &codec in &self.order {
            let bytes = match decompress(codec, raw) {
                Ok(bytes) => bytes,
                Err(e) => {
                    trace!("codec {} rejected record: {}", codec, e);
                    continue;
                }
            };
            match accept(&bytes) {
                Ok(value) => {
                    debug!("record decoded with codec {}", codec);
                    return Some((value, codec));
                }
                Err(e) => trace!("codec {} output not a payload: {}", codec, e),
            }
        }
        None
    }
}
