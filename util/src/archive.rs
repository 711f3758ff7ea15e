//! Struct archiving functionality
//!
//! Archives are append-only CSV files within the session's archive
//! directory, one row per record.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
pub use csv::Writer;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
pub struct Archiver {
    path: PathBuf,
    writer: Writer<File>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot open the archive file {0:?}: {1}")]
    OpenError(PathBuf, std::io::Error),

    #[error("Cannot write a record to the archive: {0}")]
    WriteError(csv::Error),

    #[error("Cannot flush the archive: {0}")]
    FlushError(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(session: &Session, path: P) -> Result<Self, ArchiveError> {
        Self::open(session.arch_root.join(path))
    }

    /// Open (or create) an archive at the given path.
    ///
    /// Existing records are kept, new records are appended. The header row is
    /// only written if the file was empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::OpenError(path.clone(), e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ArchiveError::OpenError(path.clone(), e))?;

        let is_empty = file
            .metadata()
            .map(|m| m.len() == 0)
            .map_err(|e| ArchiveError::OpenError(path.clone(), e))?;

        let writer = WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);

        Ok(Self { path, writer })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), ArchiveError> {
        self.writer
            .serialize(record)
            .map_err(ArchiveError::WriteError)?;
        self.writer.flush().map_err(ArchiveError::FlushError)
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        run: u32,
        passed: bool,
    }

    #[test]
    fn test_archive_appends() {
        let path = std::env::temp_dir()
            .join(format!("util_archive_test_{}", std::process::id()))
            .join("rows.csv");
        let _ = std::fs::remove_file(&path);

        {
            let mut arch = Archiver::open(&path).unwrap();
            arch.serialise(Row { run: 1, passed: true }).unwrap();
        }
        {
            let mut arch = Archiver::open(&path).unwrap();
            arch.serialise(Row { run: 2, passed: false }).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "run,passed\n1,true\n2,false\n");
    }
}
