//! Traffic recording sinks.
//!
//! [`FileSink`] appends each record to a growing binary log: one direction
//! byte (`0` sent, `1` received) followed by the raw message bytes.  Message
//! boundaries are recoverable from the `total_length` in each header.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::application::diagnostics::{Direction, MessageSink};

/// Appends records to a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Opens `path` for appending, creating it (and its directory) if needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageSink for FileSink {
    fn record(&self, direction: Direction, bytes: &[u8]) -> std::io::Result<()> {
        let mut record = Vec::with_capacity(bytes.len() + 1);
        record.push(direction as u8);
        record.extend_from_slice(bytes);
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(&record)
    }
}

/// Keeps records in memory for assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Direction, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Direction, Vec<u8>)> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl MessageSink for MemorySink {
    fn record(&self, direction: Direction, bytes: &[u8]) -> std::io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((direction, bytes.to_vec()));
        Ok(())
    }
}
