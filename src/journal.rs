//! On-disk packet journal.
//!
//! The journal is a single append-only file at a fixed path. Every completed
//! packet is appended in arrival order; the reply path reads the whole file
//! back in bounded chunks. The file is created on first append and removed on
//! orderly shutdown. The server never holds the file open between operations,
//! so each append is visible to the next read.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum bytes moved per read or send step when relaying the journal.
pub const CHUNK_SIZE: usize = 1024;

/// File mode for created files. Explicit so daemon mode's umask(0) does not
/// widen permissions.
const FILE_MODE: u32 = 0o644;

/// Handle to the journal's backing file.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append bytes to the journal, creating the backing file if absent.
    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(FILE_MODE)
            .open(&self.path)?;
        file.write_all(bytes)
    }

    /// Open the journal for a full read, returning the reader and the size
    /// at open time.
    pub fn open_reader(&self) -> io::Result<(File, u64)> {
        let file = File::open(&self.path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    /// Read the entire journal into memory, in bounded chunks.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let (mut file, size) = self.open_reader()?;
        let mut content = Vec::with_capacity(size as usize);
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..n]);
        }
        Ok(content)
    }

    /// Delete the backing file. A missing file is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Create or truncate `path` and write `contents` fully.
///
/// Standalone single-shot write used by `packetlog-write`. Shares the
/// journal's open-and-full-write semantics but truncates instead of
/// appending.
pub fn write_truncate(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)?;
    file.write_all(contents)?;
    debug!(path = %path.display(), bytes = contents.len(), "Wrote file");
    Ok(())
}
