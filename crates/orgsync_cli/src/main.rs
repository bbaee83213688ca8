//! orgsync CLI
//!
//! Operator tool for keeping the org-chart snapshot, the shared remote
//! store and the browser cache loader consistent.
//!
//! # Commands
//!
//! - `pull-tree` / `push-tree` - Transfer the whole tree
//! - `pull-positions` / `push-positions` - Transfer layout positions
//! - `export-cache` - Regenerate the local cache loader
//! - `import` - Replace the snapshot with a tree-shaped JSON file
//! - `status` - Compare snapshot and remote
//! - `backup` - List, restore or prune snapshot backups

mod commands;
mod http;

use clap::{Parser, Subcommand};
use orgsync_engine::{SyncConfig, SyncError};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Org-chart sync tool.
#[derive(Parser)]
#[command(name = "orgsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(global = true, short, long, env = "ORGSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Canonical snapshot file
    #[arg(global = true, short, long, env = "ORGSYNC_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Base URL of the remote store
    #[arg(global = true, long, env = "ORGSYNC_REMOTE_URL")]
    remote_url: Option<String>,

    /// Remote access token
    #[arg(global = true, long, env = "ORGSYNC_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Project id (defaults to the remote's active project)
    #[arg(global = true, short, long, env = "ORGSYNC_PROJECT")]
    project: Option<String>,

    /// Remote request timeout in seconds
    #[arg(global = true, long, env = "ORGSYNC_TIMEOUT")]
    timeout: Option<u64>,

    /// Skip re-reading destinations after writes
    #[arg(global = true, long)]
    no_verify: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the remote tree into the snapshot
    PullTree {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Replace the remote tree with the snapshot
    PushTree {
        /// Confirm that the remote tree may be overwritten
        #[arg(short, long)]
        yes: bool,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Apply remote positions to the snapshot
    PullPositions {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Merge snapshot positions into the remote
    PushPositions {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Regenerate the local cache loader from the snapshot
    ExportCache {
        /// Loader output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the snapshot with a tree-shaped JSON file
    Import {
        /// Input file
        input: PathBuf,

        /// Dry run - validate only
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Compare snapshot and remote
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Manage snapshot backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// List backups, oldest first
    List,

    /// Restore the snapshot from a backup
    Restore {
        /// Backup file
        backup: PathBuf,
    },

    /// Delete old backups
    Prune {
        /// Keep only the newest N backups
        #[arg(long)]
        keep_last: Option<usize>,

        /// Delete backups older than N days
        #[arg(long)]
        max_age_days: Option<u64>,

        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
    },
}

/// Builds the single configuration object: file, then flags and env.
fn load_config(cli: &Cli) -> Result<SyncConfig, SyncError> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(snapshot) = &cli.snapshot {
        config.snapshot_path = snapshot.clone();
    }
    if let Some(url) = &cli.remote_url {
        config.remote.base_url = url.clone();
    }
    if let Some(token) = &cli.auth_token {
        config.remote.auth_token = Some(token.clone());
    }
    if let Some(project) = &cli.project {
        config.project_id = Some(project.clone());
    }
    if let Some(secs) = cli.timeout {
        config.remote = config.remote.with_timeout(Duration::from_secs(secs));
    }
    if cli.no_verify {
        config.verify_after_write = false;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::PullTree { dry_run } => commands::transfer::pull_tree(&config, dry_run)?,
        Commands::PushTree { yes, dry_run } => {
            commands::transfer::push_tree(&config, yes, dry_run)?
        }
        Commands::PullPositions { dry_run } => {
            commands::transfer::pull_positions(&config, dry_run)?
        }
        Commands::PushPositions { dry_run } => {
            commands::transfer::push_positions(&config, dry_run)?
        }
        Commands::ExportCache { output } => {
            if let Some(output) = output {
                config.cache_path = output;
            }
            commands::transfer::export_cache(&config)?;
        }
        Commands::Import { input, dry_run } => {
            commands::transfer::import(&config, &input, dry_run)?
        }
        Commands::Status { format } => commands::status::run(&config, &format)?,
        Commands::Backup { command } => match command {
            BackupCommands::List => commands::backup::list(&config)?,
            BackupCommands::Restore { backup } => commands::backup::restore(&config, &backup)?,
            BackupCommands::Prune {
                keep_last,
                max_age_days,
                dry_run,
            } => commands::backup::prune(&config, keep_last, max_age_days, dry_run)?,
        },
        Commands::Version => {
            println!("orgsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("orgsync core v{}", orgsync_core::VERSION);
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        let code = err.downcast_ref::<SyncError>().map_or(1, SyncError::exit_code);
        process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("orgsync.json");
        std::fs::write(
            &path,
            r#"{"project_id": "from-file", "remote": {"base_url": "https://file.example.com"}}"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "orgsync",
            "--config",
            path.to_str().unwrap(),
            "--project",
            "from-flag",
            "--no-verify",
            "status",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.project_id.as_deref(), Some("from-flag"));
        assert_eq!(config.remote.base_url, "https://file.example.com");
        assert!(!config.verify_after_write);
    }

    #[test]
    fn push_tree_flags() {
        let cli = Cli::parse_from(["orgsync", "push-tree", "--yes"]);
        assert!(matches!(
            cli.command,
            Commands::PushTree {
                yes: true,
                dry_run: false
            }
        ));
    }
}
