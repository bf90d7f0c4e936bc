//! Command handlers
//!
//! Each handler wires the configured collaborators into the engine, runs it,
//! and returns a process exit code.

use super::commands::{AuditArgs, CrawlArgs, ResumeArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::config::SiteprobeConfig;
use crate::crawl::{CrawlQueue, HttpVisitor, RouteCrawler};
use crate::findings::NullReproducer;
use crate::pipeline::{
    AuditContext, AuditOrchestrator, CheckpointManager, PhaseRegistry,
};
use crate::progress::LoggingHandler;
use crate::routes::CoverageTracker;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub async fn handle_audit(args: &AuditArgs) -> i32 {
    match run_audit(args, None).await {
        Ok(()) => 0,
        Err(error) => {
            error!("Audit failed: {error:#}");
            1
        }
    }
}

pub async fn handle_resume(args: &ResumeArgs) -> i32 {
    let config = match load_config() {
        Ok(config) => config,
        Err(error) => {
            error!("{error:#}");
            return 2;
        }
    };
    let state_dir = args.state_dir.clone().unwrap_or(config.state_dir.clone());

    // Recover the target from the checkpointed preflight artifact when the
    // caller does not repeat it.
    let target = match &args.target {
        Some(target) => target.clone(),
        None => match checkpointed_target(&state_dir) {
            Some(target) => target,
            None => {
                error!(
                    "no resumable checkpoint in {} and no --target given",
                    state_dir.display()
                );
                return 2;
            }
        },
    };

    let audit_args = AuditArgs {
        target,
        state_dir: Some(state_dir),
        codebase: None,
        max_pages: None,
        budget: None,
        format: args.format,
        output: args.output.clone(),
    };
    match run_audit(&audit_args, Some(config)).await {
        Ok(()) => 0,
        Err(error) => {
            error!("Resume failed: {error:#}");
            1
        }
    }
}

pub async fn handle_crawl(args: &CrawlArgs) -> i32 {
    match run_crawl(args).await {
        Ok(()) => 0,
        Err(error) => {
            error!("Crawl failed: {error:#}");
            1
        }
    }
}

async fn run_audit(args: &AuditArgs, config: Option<SiteprobeConfig>) -> Result<()> {
    let mut config = match config {
        Some(config) => config,
        None => load_config()?,
    };
    if let Some(dir) = &args.state_dir {
        config.state_dir = dir.clone();
    }
    if let Some(max_pages) = args.max_pages {
        config.max_pages = max_pages;
    }
    if let Some(budget) = args.budget {
        config.total_budget = budget;
    }
    config.validate()?;

    let visitor = Arc::new(
        HttpVisitor::new(Duration::from_secs(30)).context("failed to build HTTP visitor")?,
    );
    let mut ctx = AuditContext::new(
        args.target.clone(),
        config.state_dir.clone(),
        visitor,
        Arc::new(NullReproducer),
    )
    .with_progress(Arc::new(LoggingHandler))
    .with_crawl_options(config.crawl_options())
    .with_verify_options(config.verify_options());
    if let Some(codebase) = &args.codebase {
        ctx = ctx.with_codebase_path(codebase.clone());
    }

    let mut orchestrator = AuditOrchestrator::new(
        PhaseRegistry::standard(),
        CheckpointManager::new(config.state_dir.clone()),
        config.total_budget,
    );
    install_ctrl_c(orchestrator.cancel_flag());

    let report = orchestrator.run(&mut ctx).await?;

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    let rendered = formatter.format_report(&report)?;
    formatter.emit(&rendered, args.output.as_deref())?;
    Ok(())
}

async fn run_crawl(args: &CrawlArgs) -> Result<()> {
    let config = load_config()?;
    let mut options = config.crawl_options();
    if let Some(max_pages) = args.max_pages {
        options = options.with_max_pages(max_pages);
    }
    if let Some(max_depth) = args.max_depth {
        options = options.with_max_depth(max_depth);
    }
    if let Some(rate_limit_ms) = args.rate_limit_ms {
        options = options.with_rate_limit(Duration::from_millis(rate_limit_ms));
    }

    let state_dir = args.state_dir.clone().unwrap_or(config.state_dir);
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("cannot create {}", state_dir.display()))?;

    let tracker = CoverageTracker::new(Default::default(), options.max_per_pattern);
    let queue = CrawlQueue::new(
        uuid::Uuid::new_v4().to_string(),
        options.max_depth,
        options.max_queue_size,
    )
    .with_persist_path(state_dir.join("queue.json"));
    let visitor = Arc::new(
        HttpVisitor::new(Duration::from_secs(30)).context("failed to build HTTP visitor")?,
    );

    let mut crawler = RouteCrawler::new(visitor, tracker, queue, options)?
        .with_progress(Arc::new(LoggingHandler));
    install_ctrl_c(crawler.abort_flag());

    info!(target = %args.target, "Starting crawl");
    let summary = crawler.crawl(&args.target).await?;
    let coverage = serde_json::json!({
        "report": crawler.tracker().coverage(),
    });

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    let rendered = formatter.format_crawl(&summary, &coverage)?;
    formatter.emit(&rendered, None)?;
    Ok(())
}

fn load_config() -> Result<SiteprobeConfig> {
    let config = SiteprobeConfig::from_env().context("invalid configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn checkpointed_target(state_dir: &PathBuf) -> Option<String> {
    let checkpoint: Value =
        crate::persist::read_json(&state_dir.join("checkpoint.json")).ok()?;
    checkpoint
        .get("stateSnapshot")?
        .get("preflight")?
        .get("target_url")?
        .as_str()
        .map(String::from)
}

/// Flip the shared cancellation flag on Ctrl-C; the crawler loop and the
/// orchestrator check it and stop cleanly with the last checkpoint intact.
fn install_ctrl_c(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            flag.store(true, Ordering::Relaxed);
        }
    });
}
