//! # Timeline Vault CLI (`tlv`)
//!
//! The `tlv` binary is the primary interface for Timeline Vault. It
//! provides commands for serving the HTTP API, running archive and text
//! exports from the shell, and inspecting the record store.
//!
//! ## Usage
//!
//! ```bash
//! tlv --config ./config/tlv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tlv serve` | Start the HTTP API server |
//! | `tlv export --output DCIM.zip` | Export attachments into a ZIP archive |
//! | `tlv text --output prompts.json` | Export item texts as JSON |
//! | `tlv records` | Summarize the record store per group |
//!
//! ## Examples
//!
//! ```bash
//! # Export the desired-list's media since New Year
//! tlv export --output DCIM.zip --date 20240101
//!
//! # Export one record's full history
//! tlv export --output DCIM.zip --name "A" --group "G1"
//!
//! # Export everything, with machine-readable progress
//! tlv export --output DCIM.zip --all --progress json
//!
//! # Start the API server
//! tlv serve --config ./config/tlv.toml
//! ```

mod archive;
mod auth;
mod config;
mod export;
mod fetch;
mod models;
mod plan;
mod prompts;
mod report;
mod select;
mod server;
mod store;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::fetch::StoreFetcher;
use crate::report::ProgressMode;
use crate::select::{ExportFilter, ExportRequest};

/// Timeline Vault CLI — a local-first timeline aggregation and bulk media
/// export service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tlv.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tlv",
    about = "Timeline Vault — aggregate timestamped records and export their media as one archive",
    version,
    long_about = "Timeline Vault aggregates per-entity JSON record documents from disk and \
    exports their media attachments as a single ZIP archive, fetched under a fixed concurrency \
    cap. Exports can be filtered by entity, by a desired-list of names, or by cutoff date, and \
    are also reachable over an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tlv.toml`. Store layout, groups, export
    /// tuning, auth, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/tlv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// dashboard, item listing, and export endpoints.
    Serve,

    /// Export attachments into a ZIP archive.
    ///
    /// Selects records, plans one fetch per qualifying attachment, fetches
    /// them under the configured worker cap, and writes every success into
    /// the output archive. Individual fetch failures are logged and
    /// skipped; the archive still finalizes.
    Export {
        /// Output archive path.
        #[arg(long)]
        output: PathBuf,

        /// Record name (requires --group). Exports this record's full
        /// history, ignoring --date.
        #[arg(long, requires = "group")]
        name: Option<String>,

        /// Record group (requires --name).
        #[arg(long, requires = "name")]
        group: Option<String>,

        /// Only include items published on or after this date (yyyyMMdd).
        #[arg(long)]
        date: Option<String>,

        /// Narrow the export to a single item id.
        #[arg(long)]
        item: Option<String>,

        /// Export every record instead of the desired-list.
        #[arg(long, conflicts_with_all = ["name", "group"])]
        all: bool,

        /// Progress output: off, human, or json. Defaults by TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Export item texts as a JSON document.
    ///
    /// Same selection semantics as `export`, but collects textual bodies
    /// instead of fetching media.
    Text {
        /// Output JSON path.
        #[arg(long)]
        output: PathBuf,

        /// Record name (requires --group).
        #[arg(long, requires = "group")]
        name: Option<String>,

        /// Record group (requires --name).
        #[arg(long, requires = "name")]
        group: Option<String>,

        /// Only include items published on or after this date (yyyyMMdd).
        #[arg(long)]
        date: Option<String>,

        /// Narrow to a single item id.
        #[arg(long)]
        item: Option<String>,

        /// Include every record instead of the desired-list.
        #[arg(long, conflicts_with_all = ["name", "group"])]
        all: bool,
    },

    /// Summarize the record store.
    ///
    /// Shows record and item counts per configured group, and whether the
    /// group's directory exists. Useful for verifying configuration.
    Records,
}

fn parse_progress(mode: Option<&str>) -> Result<ProgressMode> {
    match mode {
        None => Ok(ProgressMode::default_for_tty()),
        Some("off") => Ok(ProgressMode::Off),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some(other) => bail!("Unknown progress mode: '{}'. Must be off, human, or json.", other),
    }
}

fn build_request(
    config: &config::Config,
    name: Option<String>,
    group: Option<String>,
    date: Option<&str>,
    item: Option<String>,
    all: bool,
) -> Result<ExportRequest> {
    let cutoff = date.map(select::parse_cutoff).transpose()?;
    let filter = match (name, group) {
        (Some(name), Some(group)) => ExportFilter::Single { name, group },
        _ if all => ExportFilter::All,
        _ => ExportFilter::Desired(store::load_desired_list(config, None)),
    };
    Ok(ExportRequest {
        filter,
        cutoff,
        item,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Export {
            output,
            name,
            group,
            date,
            item,
            all,
            progress,
        } => {
            let request = build_request(&cfg, name, group, date.as_deref(), item, all)?;
            let reporter = parse_progress(progress.as_deref())?.reporter();

            let sink = std::fs::File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let fetcher = Arc::new(StoreFetcher::new(&cfg.export)?);

            let result = export::run_export(&cfg, &request, fetcher, sink, reporter.as_ref()).await;
            let (_, outcome) = match result {
                Ok(done) => done,
                Err(e) => {
                    // Don't leave a truncated archive behind.
                    let _ = std::fs::remove_file(&output);
                    return Err(e.into());
                }
            };

            println!(
                "Exported {} of {} attachments to {} ({} failed)",
                outcome.succeeded,
                outcome.attempted,
                output.display(),
                outcome.failed
            );
        }
        Commands::Text {
            output,
            name,
            group,
            date,
            item,
            all,
        } => {
            let request = build_request(&cfg, name, group, date.as_deref(), item, all)?;
            let entries = prompts::run_text_export(&cfg, &request)?;

            let mut file = std::fs::File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            serde_json::to_writer_pretty(&mut file, &entries)?;
            file.write_all(b"\n")?;

            println!("Exported {} text entries to {}", entries.len(), output.display());
        }
        Commands::Records => {
            println!("{:<24} {:<10} {:<10} HEALTHY", "GROUP", "RECORDS", "ITEMS");
            for group in &cfg.groups {
                let records = store::load_group_records(&cfg, &group.name);
                let items: usize = records.iter().map(|r| r.items.len()).sum();
                let healthy = cfg.store.root.join(&group.name).is_dir();
                println!(
                    "{:<24} {:<10} {:<10} {}",
                    group.name,
                    records.len(),
                    items,
                    healthy
                );
            }
        }
    }

    Ok(())
}
