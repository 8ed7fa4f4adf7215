/// # docs-sync CLI Interface (Module)
///
/// Command parsing and orchestration glue for the `docs-sync` binary. All
/// pipeline logic lives in `docs-sync-core`; this module only loads config,
/// builds the concrete detector/runner/client and maps results to exit codes.
///
/// - `sync`: detect → build → stage → publish for a commit pair. With
///   `--json` the run report is printed whether the run succeeds or fails.
/// - `detect`: print the changed integrations, one per line.
///
/// For programmatic/integration use, call [`run`] with a constructed [`Cli`].
use crate::load_config::load_config;
use crate::upload::{ApiKey, ReadmeClient};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docs_sync_core::build::CommandBuildRunner;
use docs_sync_core::config::{SyncConfig, DEFAULT_INTEGRATIONS_ROOT};
use docs_sync_core::contract::ChangeDetector;
use docs_sync_core::detect::GitChangeDetector;
use docs_sync_core::synchronise::synchronise_report;
use std::path::PathBuf;
use std::time::Duration;

/// CLI for docs-sync: publish the generated docs of changed integrations.
#[derive(Parser)]
#[clap(
    name = "docs-sync",
    version,
    about = "Build and publish docs for the integrations changed by a push"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect changed integrations, build their docs and publish them
    Sync {
        /// Path to the YAML config file (defaults apply when omitted)
        #[clap(long)]
        config: Option<PathBuf>,
        /// Commit the push started from
        #[clap(long, env = "DOCS_SYNC_BASE")]
        base: String,
        /// Commit the push ended at
        #[clap(long, env = "DOCS_SYNC_HEAD")]
        head: String,
        /// Parse and report staged pages without calling the docs host
        #[clap(long)]
        dry_run: bool,
        /// Abort the whole run after this many seconds
        #[clap(long)]
        deadline_secs: Option<u64>,
        /// Print the run report as JSON on stdout
        #[clap(long)]
        json: bool,
    },
    /// Print the integrations changed between two commits
    Detect {
        #[clap(long, env = "DOCS_SYNC_BASE")]
        base: String,
        #[clap(long, env = "DOCS_SYNC_HEAD")]
        head: String,
        #[clap(long, default_value = ".")]
        repo_root: PathBuf,
        #[clap(long, default_value = DEFAULT_INTEGRATIONS_ROOT)]
        integrations_root: String,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            base,
            head,
            dry_run,
            deadline_secs,
            json,
        } => {
            let mut config = match config {
                Some(path) => load_config(path)?,
                None => SyncConfig::default(),
            };
            config.publish.dry_run |= dry_run;
            tracing::info!(command = "sync", %base, %head, "Starting docs synchronisation");

            let sync = run_sync(&config, &base, &head, json);
            let result = match deadline_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), sync)
                    .await
                    .map_err(|_| anyhow::anyhow!("Run deadline of {secs}s exceeded, aborted"))
                    .and_then(|r| r),
                None => sync.await,
            };
            if let Err(e) = &result {
                tracing::error!(command = "sync", error = %e, "Synchronisation failed");
            }
            result
        }
        Commands::Detect {
            base,
            head,
            repo_root,
            integrations_root,
        } => {
            let detector = GitChangeDetector::new(repo_root, integrations_root);
            let changes = detector
                .detect(&base, &head)
                .await
                .context("Change detection failed")?;
            for integration in changes.iter() {
                println!("{integration}");
            }
            Ok(())
        }
    }
}

async fn run_sync(config: &SyncConfig, base: &str, head: &str, json: bool) -> Result<()> {
    let detector = GitChangeDetector::new(&config.repo_root, &config.integrations_root);
    let runner = CommandBuildRunner::from_config(&config.build)?;
    let host = ReadmeClient::new(&config.publish.base_url, ApiKey::from_env())?;

    let pipeline = synchronise_report(config, base, head, &detector, &runner, &host);
    let (report, result) = tokio::select! {
        outcome = pipeline => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, aborting in-flight builds");
            anyhow::bail!("Interrupted");
        }
    };

    // The JSON report is printed for failed runs too, with state `failed`.
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    result?;

    tracing::info!(command = "sync", state = ?report.state, "Synchronisation complete");
    if json {
        return Ok(());
    }
    if report.changes.is_empty() {
        println!("No integration changed between {base} and {head}.");
    } else {
        println!(
            "Synchronised {} integration(s), published {} page(s) to version {}.",
            report.changes.len(),
            report.published.len(),
            config.publish.version
        );
        for record in &report.published {
            println!("  {:?} {} ({})", record.action, record.slug, record.file_name);
        }
    }
    Ok(())
}
