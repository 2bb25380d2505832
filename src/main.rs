//! Site backup tool
//!
//! On-demand backup of an application's MySQL data (logical SQL dump, no
//! native dump tools) and its content tree (streamed zip archive), plus
//! listing and traversal-safe deletion of the stored artifacts.

// sitebackup/src/main.rs
mod backup;
mod catalog;
mod config;
mod errors;
mod utils;

use anyhow::{Context, Result};
use backup::{BackupStatus, Level};
use config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run_app().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = PathBuf::from("config.json");
    let config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    match choice.as_str() {
        "1" | "backup" => run_backup(&config).await,
        "2" | "list" => run_list(&config),
        "3" | "delete" => {
            let name = if args.len() > 2 {
                args[2].clone()
            } else {
                prompt_line("Enter the backup name to delete: ")?
            };
            run_delete(&config, &name)
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (backup), '2' (list), or '3' (delete).");
            anyhow::bail!("Invalid operation choice");
        }
    }
}

async fn run_backup(config: &AppConfig) -> Result<()> {
    println!("🚀 Starting backup...");
    let result = backup::run_backup_flow(config)
        .await
        .context("Backup run failed before either step could start")?;

    for diagnostic in &result.diagnostics {
        let tag = match diagnostic.level {
            Level::Info => "ℹ",
            Level::Warning => "⚠",
            Level::Error => "❌",
        };
        println!("  {} {}", tag, diagnostic.message);
    }

    match result.status() {
        BackupStatus::Success => println!("✅ Backup completed successfully."),
        BackupStatus::Partial => println!("⚠ Backup completed with some errors."),
        BackupStatus::Failure => anyhow::bail!("Backup failed: neither artifact was produced"),
    }
    Ok(())
}

fn run_list(config: &AppConfig) -> Result<()> {
    let backup_dir = utils::paths::resolve_backup_dir(&config.upload_root)?;
    let artifacts = catalog::list_backups(&backup_dir)?;

    if artifacts.is_empty() {
        println!("No backups found in {}", backup_dir.display());
        return Ok(());
    }

    println!("Backups in {} (newest first):", backup_dir.display());
    for artifact in artifacts {
        println!(
            "  {:<50} {:>10}  {}  [{}]",
            artifact.name,
            catalog::format_size(artifact.size_bytes),
            artifact.modified_at.format("%Y-%m-%d %H:%M:%S"),
            artifact.kind.label()
        );
    }
    Ok(())
}

fn run_delete(config: &AppConfig, name: &str) -> Result<()> {
    let backup_dir = utils::paths::resolve_backup_dir(&config.upload_root)?;
    match catalog::delete_backup(&backup_dir, name) {
        Ok(catalog::DeleteOutcome::Deleted) => {
            println!("✅ Backup {:?} deleted.", name);
            Ok(())
        }
        Ok(catalog::DeleteOutcome::NotFound) => {
            println!("⚠ Backup {:?} not found.", name);
            Ok(())
        }
        Err(errors::BackupError::PathTraversal { .. }) => {
            println!("❌ Security warning: that name resolves outside the backup directory. Operation blocked.");
            anyhow::bail!("Deletion blocked for {:?}", name)
        }
        Err(e) => Err(e).context(format!("Failed to delete backup {:?}", name)),
    }
}

fn prompt_choice() -> Result<String> {
    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. List Backups (or type 'list')");
    println!("3. Delete a Backup (or type 'delete')");
    prompt_line("Enter your choice: ")
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::{Write, stdin, stdout};

    print!("{}", prompt);
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
