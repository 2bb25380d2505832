// sitebackup/src/backup/logic.rs
use chrono::Local;
use sqlx::mysql::MySqlPoolOptions;
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

use crate::backup::{archive, db_dump};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::utils::paths;

/// Severity of a single diagnostic line surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// One user-grade diagnostic line. Raw filesystem/database internals stay in
/// the logs; these messages are the translated category plus artifact name.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

impl Diagnostic {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

/// Composite pass/fail of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    Success,
    Partial,
    Failure,
}

/// Result of one backup run. The two steps are independent; a run can
/// legitimately produce a valid dump and no archive, or vice versa.
#[derive(Debug)]
pub struct BackupResult {
    pub database_ok: bool,
    pub files_ok: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl BackupResult {
    pub fn status(&self) -> BackupStatus {
        match (self.database_ok, self.files_ok) {
            (true, true) => BackupStatus::Success,
            (false, false) => BackupStatus::Failure,
            _ => BackupStatus::Partial,
        }
    }
}

/// Generates a server-side artifact name: `<prefix>-<YYYYMMDD>-<HHMMSS>-<hex>.<ext>`.
/// The random suffix keeps concurrent runs from colliding on output names.
pub(crate) fn artifact_name(prefix: &str, ext: &str) -> String {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}.{}", prefix, stamp, &suffix[..12], ext)
}

/// Runs the database dump then the file-tree archive, unconditionally in that
/// order. Failures are independent and both best-effort; no transactional
/// linkage ties the two artifacts together.
pub async fn perform_backup_orchestration(config: &AppConfig) -> Result<BackupResult> {
    let backup_dir = paths::resolve_backup_dir(&config.upload_root)?;
    let mut diagnostics = Vec::new();

    info!(backup_dir = %backup_dir.display(), "starting backup run");

    let dump_name = artifact_name("db", "sql");
    let database_ok = match dump_step(config, &backup_dir.join(&dump_name), &mut diagnostics).await
    {
        Ok(()) => {
            info!(artifact = %dump_name, "database backup written");
            diagnostics.push(Diagnostic::info(format!(
                "Database backup written: {}",
                dump_name
            )));
            true
        }
        Err(e) => {
            error!(error = %e, "database backup failed");
            diagnostics.push(Diagnostic::error(
                "Database backup failed; see the log for details",
            ));
            false
        }
    };

    // File backup is attempted even if the dump failed.
    let archive_name = artifact_name("files", "zip");
    let excluded = vec![backup_dir.clone()];
    let files_ok = match archive::archive(
        &config.content_root,
        &excluded,
        &config.extra_files,
        &backup_dir.join(&archive_name),
        &mut diagnostics,
    ) {
        Ok(()) => {
            info!(artifact = %archive_name, "files backup written");
            diagnostics.push(Diagnostic::info(format!(
                "Files backup written: {}",
                archive_name
            )));
            true
        }
        Err(e) => {
            error!(error = %e, "files backup failed");
            diagnostics.push(Diagnostic::error(
                "Files backup failed; see the log for details",
            ));
            false
        }
    };

    Ok(BackupResult {
        database_ok,
        files_ok,
        diagnostics,
    })
}

async fn dump_step(
    config: &AppConfig,
    output_path: &Path,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await?;
    let result = db_dump::dump(&pool, &config.table_prefix, output_path, diagnostics).await;
    pool.close().await;
    result
}
