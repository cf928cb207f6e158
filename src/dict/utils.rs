//! Low-level byte reading utilities

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use encoding_rs::Encoding;
use log::{debug, trace};

use super::types::error::{DictError, Result};

/// Resolves an encoding label, normalizing GBK/GB2312 to GB18030.
///
/// Unknown labels fall back to UTF-8.
pub fn parse_encoding(label: &str) -> &'static Encoding {
    let label = label.trim();
    let normalized = if label.eq_ignore_ascii_case("GBK") || label.eq_ignore_ascii_case("GB2312") {
        "GB18030"
    } else {
        label
    };
    Encoding::for_label(normalized.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

/// Decodes word bytes with the volume encoding, replacing malformed sequences.
pub fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// A file handle opened once and shared by every lookup on a volume.
///
/// Reads are positional: each call seeks under the lock, so concurrent
/// readers never observe each other's cursor.
#[derive(Debug)]
pub struct SharedFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
    len: u64,
}

impl SharedFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset.saturating_add(buf.len() as u64);
        if end > self.len {
            return Err(DictError::IllegalRead {
                position: end,
                limit: self.len,
            });
        }
        trace!("read {} bytes at {} from {}", buf.len(), offset, self.path.display());
        let mut guard = self.file.lock().map_err(|_| DictError::LockPoisoned)?;
        let file = guard.as_mut().ok_or(DictError::Closed)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn read_vec_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.len {
            return Err(DictError::IllegalRead {
                position: end,
                limit: self.len,
            });
        }
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// A sequential reader starting at `offset`.
    pub fn reader_at(&self, offset: u64) -> SharedReader<'_> {
        SharedReader { file: self, pos: offset }
    }

    /// Releases the OS handle. Later reads fail with `DictError::Closed`.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.file.lock().map_err(|_| DictError::LockPoisoned)?;
        if guard.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
        Ok(())
    }
}

/// `Read` adapter over positional reads of a [`SharedFile`].
pub struct SharedReader<'a> {
    file: &'a SharedFile,
    pos: u64,
}

impl Read for SharedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.file.len().saturating_sub(self.pos);
        let n = (buf.len() as u64).min(remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        self.file
            .read_exact_at(self.pos, &mut buf[..n])
            .map_err(|e| match e {
                DictError::Io(io) => io,
                other => std::io::Error::other(other.to_string()),
            })?;
        self.pos += n as u64;
        Ok(n)
    }
}
