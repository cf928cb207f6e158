//! Side-cache file for incrementally built short indexes.
//!
//! ```text
//! [4 bytes]  b"LXSI"
//! [N bytes]  bincode(IndexCacheFile)
//! [4 bytes]  Adler-32 of the bincode body, big-endian
//! ```
//!
//! The cache is never authoritative. Anything unexpected, from a bad
//! checksum to a different title, makes the caller discard it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::dict::types::error::{DictError, Result};
use crate::dict::types::models::VolumeId;

const MAGIC: &[u8; 4] = b"LXSI";
pub const EXTENSION: &str = "shortidx";

/// What the cached buckets were built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIdentity {
    pub title: String,
    pub version: String,
    pub timestamp: u64,
    pub index_count: u64,
    /// [`Collator::fingerprint`](crate::dict::collation::Collator::fingerprint)
    pub collator: u64,
    pub max_depth: usize,
}

/// Buckets per depth: `(primary weight prefix, candidate positions)`.
pub type BucketList = Vec<Vec<(Vec<u8>, Vec<u64>)>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCacheFile {
    pub identity: CacheIdentity,
    pub buckets: BucketList,
}

/// Cache file location for a volume inside `dir`.
pub fn cache_path(dir: &Path, volume: &VolumeId) -> PathBuf {
    let mut seed = Vec::new();
    for part in [&volume.title, &volume.version, &volume.file_name] {
        seed.extend_from_slice(part.as_bytes());
        seed.push(0);
    }
    let name = hex::encode(XxHash64::oneshot(0, &seed).to_be_bytes());
    dir.join(format!("{}.{}", name, EXTENSION))
}

impl IndexCacheFile {
    /// Reads a cache file; `Ok(None)` when there is none.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(DictError::Cache(format!("{}: not an index cache", path.display())));
        }
        let (body, trailer) = bytes[MAGIC.len()..].split_at(bytes.len() - MAGIC.len() - 4);
        let expected = BigEndian::read_u32(trailer);
        let actual = adler32_slice(body);
        if expected != actual {
            return Err(DictError::Cache(format!(
                "{}: checksum mismatch (expected {:08x}, got {:08x})",
                path.display(),
                expected,
                actual
            )));
        }
        trace!("Index cache {} checksum ok", path.display());
        Ok(Some(bincode::deserialize(body)?))
    }

    /// Writes the cache through a temporary file so readers never see a
    /// partial one.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let body = bincode::serialize(self)?;
        let mut checksum = [0u8; 4];
        BigEndian::write_u32(&mut checksum, adler32_slice(&body));

        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(MAGIC)?;
            file.write_all(&body)?;
            file.write_all(&checksum)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        debug!("Index cache written to {} ({} bytes)", path.display(), body.len() + 8);
        Ok(())
    }
}
