//! Resource payload storage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Buffers beyond this size should use a file-backed payload.
pub const SMALL_RESOURCE_WARN_BYTES: usize = 200 * 1024;

/// Payload of a resource: an in-memory buffer or a backing file.
#[derive(Debug)]
pub enum Payload {
    Memory(Vec<u8>),
    File(FileBody),
}

impl Payload {
    pub fn is_file(&self) -> bool {
        matches!(self, Payload::File(_))
    }

    /// Payload length in bytes. A missing backing file counts as empty.
    pub fn len(&self) -> io::Result<u64> {
        match self {
            Payload::Memory(data) => Ok(data.len() as u64),
            Payload::File(body) => match fs::metadata(body.path()) {
                Ok(meta) => Ok(meta.len()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
                Err(e) => Err(e),
            },
        }
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read the whole payload into memory.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match self {
            Payload::Memory(data) => Ok(data.clone()),
            Payload::File(body) => match fs::read(body.path()) {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
                Err(e) => Err(e),
            },
        }
    }

    /// Replace the payload contents.
    pub fn replace(&mut self, data: Vec<u8>) -> io::Result<()> {
        match self {
            Payload::Memory(buf) => {
                if data.len() > SMALL_RESOURCE_WARN_BYTES {
                    warn!(
                        bytes = data.len(),
                        "in-memory payload exceeds the small-resource threshold"
                    );
                }
                *buf = data;
                Ok(())
            }
            Payload::File(body) => body.write(&data),
        }
    }
}

/// File-backed payload.
///
/// A transient body deletes its file when dropped; it is used for staging
/// copies that only live for one update cycle.
#[derive(Debug)]
pub struct FileBody {
    path: PathBuf,
    transient: bool,
}

impl FileBody {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            transient: false,
        }
    }

    pub fn transient(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            transient: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Temporary path used while streaming a new body.
    pub fn part_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".part");
        PathBuf::from(name)
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let part = self.part_path();
        fs::write(&part, data)?;
        fs::rename(&part, &self.path)
    }
}

impl Drop for FileBody {
    fn drop(&mut self) {
        if self.transient {
            let _ = fs::remove_file(&self.path);
            let _ = fs::remove_file(self.part_path());
        }
    }
}
