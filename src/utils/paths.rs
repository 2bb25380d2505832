// sitebackup/src/utils/paths.rs
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::errors::{BackupError, Result};

/// Directory name for backups within the host's upload root.
pub const BACKUP_DIR_NAME: &str = "backups";

/// Resolves the canonical backup directory under `upload_root`, creating it
/// if missing. Safe to call on every run.
pub fn resolve_backup_dir(upload_root: &Path) -> Result<PathBuf> {
    let dir = upload_root.join(BACKUP_DIR_NAME);
    if !dir.is_dir() {
        fs::create_dir_all(&dir).map_err(|source| BackupError::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(dir)
}

/// Validates that `name` resolves to a direct child of `base`.
///
/// This is the single security-critical primitive: every deletion goes through
/// it. The name must be a bare filename (no separators, no `.`/`..`, no
/// traversal sequences), and if an entry with that name exists its canonical
/// path (symlinks resolved) must sit directly inside the canonical base.
/// Anything unresolvable fails closed. A name with no entry behind it
/// validates structurally; deletion reports not-found separately.
pub fn validate_child(base: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(traversal_blocked(base, name));
    }

    let canonical_base = base
        .canonicalize()
        .map_err(|_| traversal_blocked(base, name))?;
    let candidate = canonical_base.join(name);

    if fs::symlink_metadata(&candidate).is_ok() {
        // Entry exists; make sure it does not resolve outside the base
        // (e.g. a symlink planted in the backup directory).
        let canonical = candidate
            .canonicalize()
            .map_err(|_| traversal_blocked(base, name))?;
        if canonical.parent() != Some(canonical_base.as_path()) {
            return Err(traversal_blocked(base, name));
        }
    }

    Ok(candidate)
}

fn traversal_blocked(base: &Path, name: &str) -> BackupError {
    warn!(
        base = %base.display(),
        name,
        "security: blocked attempt to resolve a path outside the backup directory"
    );
    BackupError::PathTraversal {
        name: name.to_string(),
    }
}
