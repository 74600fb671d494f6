//! Durable output sinks
//!
//! Every chunk a supervised process writes on stdout or stderr is appended to
//! the harness's [`LogSink`] in arrival order. The file sink outlives both the
//! process and the harness, so a failed run can be diagnosed after the fact.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Append-only destination for raw process output
pub trait LogSink: Send + Sync {
    /// Append one chunk of output
    fn append(&self, chunk: &[u8]) -> io::Result<()>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn append(&self, _chunk: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// This process's stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn append(&self, chunk: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(chunk)?;
        out.flush()
    }
}

/// This process's stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn append(&self, chunk: &[u8]) -> io::Result<()> {
        io::stderr().lock().write_all(chunk)
    }
}

/// Appends to a file on disk, creating it (and its parents) on open
#[derive(Debug)]
pub struct FileLogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogSink {
    /// Open `path` for appending
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn append(&self, chunk: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(chunk)?;
        file.flush()
    }
}

/// Keeps output in memory; mostly useful in tests
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything appended so far, decoded lossily
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, chunk: &[u8]) -> io::Result<()> {
        self.bytes.lock().extend_from_slice(chunk);
        Ok(())
    }
}
