//! # phonelink
//!
//! Command line frontend for the phonelink device link.
//!
//! ## Commands
//!
//! - `demo`: Run a scripted session against a simulated phone
//! - `schedule`: Manage scheduled messages in the link database
//!
//! ## Example
//!
//! ```bash
//! # Watch every channel work end to end without a phone
//! phonelink demo
//!
//! # Queue a message for later
//! phonelink schedule add --to "+15550182" --body "On my way" --in-secs 600
//!
//! # See what is queued
//! phonelink schedule list
//!
//! # Change your mind
//! phonelink schedule cancel 7c1a
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use link_desktop::{LinkConfig, SqliteStore};

mod commands;

use commands::{demo, schedule};

/// Command line frontend for the phonelink device link.
#[derive(Parser, Debug)]
#[command(name = "phonelink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a phonelink.toml configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted session against a simulated phone
    Demo,

    /// Manage scheduled messages in the link database
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// Queue a message for a future send
    Add {
        /// Recipient phone number
        #[arg(long)]
        to: String,

        /// Recipient display name
        #[arg(long)]
        name: Option<String>,

        /// Message body
        #[arg(long)]
        body: String,

        /// Send time as RFC 3339, e.g. "2026-09-01T09:30:00Z"
        #[arg(long, conflicts_with = "in_secs")]
        at: Option<String>,

        /// Send this many seconds from now
        #[arg(long, conflicts_with = "at")]
        in_secs: Option<u64>,
    },

    /// List every scheduled message
    List,

    /// Cancel a pending message (the record stays listed)
    Cancel {
        /// Message id, or an unambiguous prefix of one
        id: String,
    },

    /// Delete a message record in any state
    Delete {
        /// Message id, or an unambiguous prefix of one
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Demo => {
            demo::run(config).await?;
        }
        Commands::Schedule { action } => {
            let store = SqliteStore::new(&config.database_path)
                .await
                .context("Failed to open the link database")?;
            match action {
                ScheduleAction::Add {
                    to,
                    name,
                    body,
                    at,
                    in_secs,
                } => {
                    let when = parse_send_time(at.as_deref(), in_secs)?;
                    schedule::add(&store, to, name, body, when).await?;
                }
                ScheduleAction::List => {
                    schedule::list(&store).await?;
                }
                ScheduleAction::Cancel { id } => {
                    schedule::cancel(&store, &id).await?;
                }
                ScheduleAction::Delete { id } => {
                    schedule::delete(&store, &id).await?;
                }
            }
        }
    }

    Ok(())
}

/// Load configuration from the given file, or fall back to defaults.
fn load_config(path: Option<&Path>) -> Result<LinkConfig> {
    match path {
        Some(path) => LinkConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(LinkConfig::default()),
    }
}

/// Resolve `--at` / `--in-secs` into a concrete send time.
fn parse_send_time(at: Option<&str>, in_secs: Option<u64>) -> Result<DateTime<Utc>> {
    match (at, in_secs) {
        (Some(at), None) => {
            let parsed = DateTime::parse_from_rfc3339(at)
                .with_context(|| format!("{at} is not an RFC 3339 time"))?;
            Ok(parsed.with_timezone(&Utc))
        }
        (None, Some(secs)) => {
            let secs = i64::try_from(secs).context("--in-secs is too large")?;
            Ok(Utc::now() + chrono::Duration::seconds(secs))
        }
        _ => anyhow::bail!("Must specify either --at or --in-secs"),
    }
}
