//! Append-only intermediate byte store.
//!
//! The encoder writes into a temporary file; the relay tails it with its own
//! read handle. The file is removed when the store is dropped.

use std::io;
use std::path::Path;

use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;

/// Temporary file shared between one encoder and one relay
#[derive(Debug)]
pub struct IntermediateStore {
    path: TempPath,
}

impl IntermediateStore {
    /// Create an empty store in the system temp directory
    pub fn create() -> io::Result<Self> {
        Self::create_in(std::env::temp_dir())
    }

    /// Create an empty store in `dir`
    pub fn create_in(dir: impl AsRef<Path>) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("hmocast-transcode-")
            .tempfile_in(dir)?;

        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    /// Path the encoder writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes
    pub async fn size(&self) -> io::Result<u64> {
        Ok(fs::metadata(self.path()).await?.len())
    }

    /// Open a reader positioned at the start of the store
    pub async fn open_reader(&self) -> io::Result<StoreReader> {
        let file = File::open(self.path()).await?;
        Ok(StoreReader { file, position: 0 })
    }
}

/// Sequential reader over a growing store
#[derive(Debug)]
pub struct StoreReader {
    file: File,
    position: u64,
}

impl StoreReader {
    /// Read the next unread bytes; 0 means nothing is available yet
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf).await?;
        self.position += n as u64;
        Ok(n)
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }
}
