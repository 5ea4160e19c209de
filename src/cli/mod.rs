//! Command-line surface (SPEC_FULL.md §F): thin `clap`-derived dispatch
//! into the library's components. Grounded on the teacher's
//! `cli/mod.rs` `Cli`/`Commands` derive shape and its "build settings,
//! build a `DbContext`, dispatch, print a human-readable summary"
//! command-handler pattern — narrowed from FOIA's scrape/import/analyze
//! surface to HealthArchive's serve/worker/job/source surface.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::models::{JobStatus, ToolOptions};
use crate::registry::{self, JobOverrides};
use crate::repository::DbContext;

#[derive(Debug, Parser)]
#[command(name = "healtharchive", about = "Preservation, indexing, and search for archived government health pages")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Boot the HTTP API server.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },
    /// Worker-loop operations (spec §4.D).
    #[command(subcommand)]
    Worker(WorkerCommand),
    /// Archive-job operations (spec §3/§4.B/§4.G).
    #[command(subcommand)]
    Job(JobCommand),
    /// Source CRUD (spec §3 "Source").
    #[command(subcommand)]
    Source(SourceCommand),
}

#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Run the worker loop until SIGINT (spec §4.D).
    Run {
        #[arg(long, env = "CRAWLER_BIN")]
        crawler_bin: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// Register a new archive job for a source (spec §4.B).
    Create {
        #[arg(long)]
        source: String,
        #[arg(long = "seed")]
        seeds: Vec<String>,
        /// `key=value` overrides applied onto the source template's
        /// default `tool_options` (e.g. `cleanup=true`).
        #[arg(long = "override")]
        overrides: Vec<String>,
    },
    /// Run the indexing pipeline for a job directly (spec §4.G).
    Index {
        job_id: String,
    },
    /// Reset stuck `running` jobs back to `retryable` (spec §4.A/§4.J).
    RecoverStale {
        #[arg(long, default_value_t = 60)]
        threshold_minutes: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum SourceCommand {
    Add {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        base_url: String,
    },
    List,
    Enable {
        code: String,
    },
    Disable {
        code: String,
    },
}

/// Entry point dispatched from `main` (spec §F).
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env().context("loading settings")?;
    let ctx = DbContext::from_url(&settings.database_url, &settings.archive_root).context("connecting to database")?;
    ctx.init_schema().await.context("initializing schema")?;

    match cli.command {
        Commands::Serve { bind } => {
            crate::server::serve(ctx, settings, bind).await?;
        }
        Commands::Worker(WorkerCommand::Run { crawler_bin }) => {
            let (_tx, rx) = tokio::sync::watch::channel(false);
            crate::worker::run_loop(ctx, crawler_bin, settings, rx).await;
        }
        Commands::Job(cmd) => run_job_command(&ctx, cmd).await?,
        Commands::Source(cmd) => run_source_command(&ctx, cmd).await?,
    }

    Ok(())
}

async fn run_job_command(ctx: &DbContext, cmd: JobCommand) -> Result<()> {
    match cmd {
        JobCommand::Create { source, seeds, overrides } => {
            let tool_options = if overrides.is_empty() {
                None
            } else {
                Some(apply_overrides(ToolOptions::default(), &overrides)?)
            };
            let job_overrides = JobOverrides {
                seeds: if seeds.is_empty() { None } else { Some(seeds) },
                tool_options,
                passthrough_args: None,
            };
            let job = registry::default_registry().create_job_for_source(ctx, &source, job_overrides).await?;
            println!("created job {} ({}) for source {} [{}]", job.id, job.name, source, job.status.as_str());
        }
        JobCommand::Index { job_id } => {
            let job = crate::index::index_job(ctx, 500, &job_id).await?;
            println!(
                "indexed job {}: status={} snapshots={}",
                job.id,
                job.status.as_str(),
                job.indexed_page_count
            );
        }
        JobCommand::RecoverStale { threshold_minutes } => {
            let recovered = crate::safety::recover_stale_jobs(ctx, threshold_minutes).await?;
            println!("recovered {recovered} stale job(s)");
        }
    }
    Ok(())
}

async fn run_source_command(ctx: &DbContext, cmd: SourceCommand) -> Result<()> {
    match cmd {
        SourceCommand::Add { code, name, base_url } => {
            let source = crate::models::Source::new(&code, &name, &base_url);
            ctx.sources().save(&source).await?;
            println!("added source {code} ({name})");
        }
        SourceCommand::List => {
            for source in ctx.sources().get_all().await? {
                let jobs = ctx.jobs().list_by_source(&source.id).await?;
                let active = jobs.iter().filter(|j| j.status != JobStatus::Failed).count();
                println!(
                    "{:<8} {:<30} {} jobs={} enabled={}",
                    source.code, source.name, source.base_url, active, source.enabled
                );
            }
        }
        SourceCommand::Enable { code } => set_source_enabled(ctx, &code, true).await?,
        SourceCommand::Disable { code } => set_source_enabled(ctx, &code, false).await?,
    }
    Ok(())
}

async fn set_source_enabled(ctx: &DbContext, code: &str, enabled: bool) -> Result<()> {
    let mut source = ctx
        .sources()
        .get_by_code(code)
        .await?
        .ok_or_else(|| anyhow::anyhow!("unknown source code: {code}"))?;
    source.enabled = enabled;
    source.updated_at = chrono::Utc::now();
    ctx.sources().save(&source).await?;
    println!("source {code} enabled={enabled}");
    Ok(())
}

/// Parses `key=value` pairs onto a base `ToolOptions` (spec §4.B "job
/// create --override KEY=VALUE"). Only the boolean/string/numeric flags
/// exposed on `ToolOptions` are recognized; anything else is rejected
/// rather than silently ignored.
fn apply_overrides(mut base: ToolOptions, overrides: &[String]) -> Result<ToolOptions> {
    for raw in overrides {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("override must be key=value, got: {raw}"))?;
        match key {
            "initial_workers" => base.initial_workers = value.parse().context("initial_workers")?,
            "cleanup" => base.cleanup = value.parse().context("cleanup")?,
            "overwrite" => base.overwrite = value.parse().context("overwrite")?,
            "log_level" => base.log_level = value.to_string(),
            "enable_monitoring" => base.enable_monitoring = value.parse().context("enable_monitoring")?,
            "monitor_interval_seconds" => base.monitor_interval_seconds = Some(value.parse().context("monitor_interval_seconds")?),
            "stall_timeout_minutes" => base.stall_timeout_minutes = Some(value.parse().context("stall_timeout_minutes")?),
            "enable_adaptive_workers" => base.enable_adaptive_workers = value.parse().context("enable_adaptive_workers")?,
            "min_workers" => base.min_workers = Some(value.parse().context("min_workers")?),
            "enable_vpn_rotation" => base.enable_vpn_rotation = value.parse().context("enable_vpn_rotation")?,
            "vpn_connect_command" => base.vpn_connect_command = Some(value.to_string()),
            "relax_perms" => base.relax_perms = value.parse().context("relax_perms")?,
            other => return Err(anyhow::anyhow!("unrecognized tool_options override: {other}")),
        }
    }
    base.validate()?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_overrides_parses_recognized_keys() {
        let opts = apply_overrides(ToolOptions::default(), &["cleanup=true".to_string(), "initial_workers=4".to_string()]).unwrap();
        assert!(opts.cleanup);
        assert_eq!(opts.initial_workers, 4);
    }

    #[test]
    fn apply_overrides_rejects_unknown_key() {
        let err = apply_overrides(ToolOptions::default(), &["bogus=1".to_string()]).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn cli_parses_serve_with_default_bind() {
        let cli = Cli::parse_from(["healtharchive", "serve"]);
        assert!(matches!(cli.command, Commands::Serve { .. }));
    }

    #[test]
    fn cli_parses_job_create_with_repeated_seeds() {
        let cli = Cli::parse_from(["healtharchive", "job", "create", "--source", "hc", "--seed", "https://a", "--seed", "https://b"]);
        match cli.command {
            Commands::Job(JobCommand::Create { source, seeds, .. }) => {
                assert_eq!(source, "hc");
                assert_eq!(seeds, vec!["https://a", "https://b"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
