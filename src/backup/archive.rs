// sitebackup/src/backup/archive.rs
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::backup::logic::Diagnostic;
use crate::errors::{BackupError, Result};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Streams the tree under `root` into a compressed zip at `output_path`.
///
/// Entries are named `<root label>/<relative path>` where the label is the
/// root directory's own name. Any directory whose canonical path sits at or
/// under one of `excluded` is pruned before descending; the backup directory
/// must always be in that set so the archive never swallows earlier backups.
///
/// The tree content is mandatory: a single failed file add aborts the run and
/// removes the partial archive. The `extra_files` are appended at archive
/// root by basename and are best-effort; a missing one is only a warning.
pub fn archive(
    root: &Path,
    excluded: &[PathBuf],
    extra_files: &[PathBuf],
    output_path: &Path,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    let label = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "content".to_string());
    let excluded: Vec<PathBuf> = excluded
        .iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
        .collect();

    let file = File::create(output_path).map_err(|source| BackupError::ArchiveOpen {
        path: output_path.to_path_buf(),
        source: ZipError::Io(source),
    })?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    info!(root = %root.display(), archive = %output_path.display(), "archiving file tree");

    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_excluded(e.path(), &excluded));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let offender = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                return abort(zip, output_path, offender, e.to_string());
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(root) {
            Ok(rel) => rel,
            Err(e) => return abort(zip, output_path, entry.path().to_path_buf(), e.to_string()),
        };
        let entry_name = format!("{}/{}", label, relative.display());
        if let Err(reason) = add_file(&mut zip, entry.path(), &entry_name, options) {
            return abort(zip, output_path, entry.path().to_path_buf(), reason);
        }
    }

    for extra in extra_files {
        if !extra.is_file() {
            warn!(path = %extra.display(), "extra file missing, skipped");
            diagnostics.push(Diagnostic::warning(format!(
                "Extra file not found, skipped: {}",
                extra.display()
            )));
            continue;
        }
        let name = extra
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Err(reason) = add_file(&mut zip, extra, &name, options) {
            warn!(path = %extra.display(), reason, "failed to add extra file, skipped");
            diagnostics.push(Diagnostic::warning(format!(
                "Could not add extra file: {}",
                extra.display()
            )));
        }
    }

    if let Err(source) = zip.finish() {
        // A half-finalized archive is as misleading as a half-written one.
        let _ = fs::remove_file(output_path);
        return Err(BackupError::ArchiveClose {
            path: output_path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Streams one file into the archive with a fixed-size buffer, so arbitrarily
/// large files never sit in memory whole.
fn add_file(
    zip: &mut ZipWriter<File>,
    path: &Path,
    entry_name: &str,
    options: FileOptions,
) -> std::result::Result<(), String> {
    zip.start_file(entry_name, options)
        .map_err(|e| e.to_string())?;
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut reader = BufReader::with_capacity(COPY_BUF_SIZE, file);
    io::copy(&mut reader, zip).map_err(|e| e.to_string())?;
    Ok(())
}

fn is_excluded(path: &Path, excluded: &[PathBuf]) -> bool {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    excluded.iter().any(|ex| canonical.starts_with(ex))
}

/// A partial archive must not be left behind looking like a valid artifact.
fn abort(zip: ZipWriter<File>, output_path: &Path, offender: PathBuf, reason: String) -> Result<()> {
    drop(zip);
    let _ = fs::remove_file(output_path);
    Err(BackupError::FileAdd {
        path: offender,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn entry_names(path: &Path) -> anyhow::Result<BTreeSet<String>> {
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        let mut names = BTreeSet::new();
        for i in 0..archive.len() {
            names.insert(archive.by_index(i)?.name().to_string());
        }
        Ok(names)
    }

    fn build_tree(root: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(root.join("themes/dark"))?;
        fs::write(root.join("index.html"), b"<html></html>")?;
        fs::write(root.join("themes/dark/style.css"), b"body {}")?;
        Ok(())
    }

    #[test]
    fn mirrors_tree_under_root_label() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let content = dir.path().join("content");
        build_tree(&content)?;
        let output = dir.path().join("files-test.zip");

        let mut diagnostics = Vec::new();
        archive(&content, &[], &[], &output, &mut diagnostics)?;

        let names = entry_names(&output)?;
        assert!(names.contains("content/index.html"));
        assert!(names.contains("content/themes/dark/style.css"));
        assert!(diagnostics.is_empty());
        Ok(())
    }

    #[test]
    fn excludes_backup_directory_subtree() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let content = dir.path().join("content");
        build_tree(&content)?;
        let backup_dir = content.join("backups");
        fs::create_dir_all(&backup_dir)?;
        fs::write(backup_dir.join("files-old.zip"), b"old archive")?;
        let output = backup_dir.join("files-new.zip");

        let mut diagnostics = Vec::new();
        archive(
            &content,
            &[backup_dir.clone()],
            &[],
            &output,
            &mut diagnostics,
        )?;

        let names = entry_names(&output)?;
        assert!(names.contains("content/index.html"));
        assert!(names.iter().all(|n| !n.contains("backups")));
        Ok(())
    }

    #[test]
    fn appends_extra_files_at_archive_root() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let content = dir.path().join("content");
        build_tree(&content)?;
        let config_file = dir.path().join("app-config.php");
        fs::write(&config_file, b"<?php")?;
        let missing = dir.path().join(".htaccess");
        let output = dir.path().join("files-extra.zip");

        let mut diagnostics = Vec::new();
        archive(
            &content,
            &[],
            &[config_file, missing],
            &output,
            &mut diagnostics,
        )?;

        let names = entry_names(&output)?;
        assert!(names.contains("app-config.php"));
        assert!(!names.contains(".htaccess"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains(".htaccess"));
        Ok(())
    }

    #[test]
    fn close_failures_are_reported_as_finalization_errors() {
        // Open and close/finalize failures carry distinct variants so the
        // reported category matches what actually failed.
        let open = BackupError::ArchiveOpen {
            path: PathBuf::from("/tmp/files-x.zip"),
            source: ZipError::Io(io::Error::other("disk full")),
        };
        let close = BackupError::ArchiveClose {
            path: PathBuf::from("/tmp/files-x.zip"),
            source: ZipError::Io(io::Error::other("disk full")),
        };
        assert!(open.to_string().contains("open"));
        assert!(close.to_string().contains("finalize"));
    }

    #[cfg(unix)]
    #[test]
    fn aborts_and_discards_archive_on_unreadable_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let content = dir.path().join("content");
        build_tree(&content)?;
        // A dangling symlink fails the walk regardless of privileges.
        std::os::unix::fs::symlink(content.join("missing"), content.join("broken.dat"))?;
        let output = dir.path().join("files-broken.zip");

        let mut diagnostics = Vec::new();
        let result = archive(&content, &[], &[], &output, &mut diagnostics);
        match result {
            Err(BackupError::FileAdd { .. }) => {}
            other => panic!("expected FileAdd, got {:?}", other),
        }
        assert!(!output.exists());
        Ok(())
    }
}
