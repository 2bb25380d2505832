use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy for the backup core.
///
/// Every component step returns a typed outcome; the orchestrator treats a
/// failed dump and a failed archive as independent and surfaces both.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to create backup directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Path traversal attempt blocked for backup name {name:?}")]
    PathTraversal { name: String },

    #[error("Database read failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Failed to write dump file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open archive {path}: {source}")]
    ArchiveOpen {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("Failed to add {path} to archive: {reason}")]
    FileAdd { path: PathBuf, reason: String },

    #[error("Failed to finalize archive {path}: {source}")]
    ArchiveClose {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("Failed to delete backup {name:?}: {source}")]
    Delete {
        name: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
