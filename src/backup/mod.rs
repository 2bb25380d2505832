pub(crate) mod archive;
pub(crate) mod db_dump;
pub(crate) mod logic;

pub use logic::{BackupResult, BackupStatus, Diagnostic, Level};

use crate::config::AppConfig;
use crate::errors::Result;

/// Public entry point for one backup run: SQL dump then file-tree archive,
/// both best-effort, aggregated into one composite result.
pub async fn run_backup_flow(config: &AppConfig) -> Result<BackupResult> {
    logic::perform_backup_orchestration(config).await
}
