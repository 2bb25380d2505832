// sitebackup/src/catalog/mod.rs
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::{BackupError, Result};
use crate::utils::paths;

/// Artifact flavor, inferred from the generated name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Database,
    FileTree,
}

impl ArtifactKind {
    pub fn from_name(name: &str) -> Self {
        if name.starts_with("db-") || name.ends_with(".sql") {
            ArtifactKind::Database
        } else {
            ArtifactKind::FileTree
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Database => "database",
            ArtifactKind::FileTree => "files",
        }
    }
}

/// A single backup output file stored in the backup directory.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: DateTime<Local>,
    pub kind: ArtifactKind,
}

/// Outcome of a deletion request. An already-absent file is a warning for the
/// caller, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Lists backup artifacts, newest first (ties broken by name, descending,
/// so the ordering is deterministic).
pub fn list_backups(backup_dir: &Path) -> Result<Vec<BackupArtifact>> {
    let mut artifacts = Vec::new();
    if !backup_dir.is_dir() {
        return Ok(artifacts);
    }

    for entry in fs::read_dir(backup_dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let modified_at = metadata
            .modified()
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| Local::now());
        artifacts.push(BackupArtifact {
            kind: ArtifactKind::from_name(&name),
            name,
            path: entry.path(),
            size_bytes: metadata.len(),
            modified_at,
        });
    }

    artifacts.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| b.name.cmp(&a.name))
    });
    Ok(artifacts)
}

/// Deletes a named artifact after path-safety validation.
///
/// The name is the only externally-supplied string entering the core; it is
/// validated against the backup directory before any filesystem mutation.
pub fn delete_backup(backup_dir: &Path, name: &str) -> Result<DeleteOutcome> {
    let target = paths::validate_child(backup_dir, name)?;

    match fs::remove_file(&target) {
        Ok(()) => {
            info!(artifact = name, "backup deleted");
            Ok(DeleteOutcome::Deleted)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(artifact = name, "backup not found for deletion");
            Ok(DeleteOutcome::NotFound)
        }
        Err(source) => Err(BackupError::Delete {
            name: name.to_string(),
            source,
        }),
    }
}

/// Human-readable size for listing output.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
