//! siteprobe - exploratory testing engine for running web applications
//!
//! This library automates exploratory testing of a running web application:
//! it discovers pages by crawling, tracks which logical routes have been
//! exercised, orchestrates a multi-phase audit pipeline, reproduces candidate
//! defects to separate real bugs from flaky ones, deduplicates findings, and
//! can be interrupted and resumed without redoing work.
//!
//! # Core Concepts
//!
//! - **Route patterns**: parameterized URLs (`/users/42`) are collapsed into
//!   logical routes (`/users/{userId}`) so coverage and crawl limits operate
//!   on a bounded set
//! - **Pipeline**: a fixed DAG of phases with budgets and an atomic
//!   checkpoint after every phase; some phases run in-process, others are
//!   delegated to an injected executor
//! - **Verification**: candidate findings are re-attempted several times and
//!   classified as verified, flaky, unreproducible or erroring
//!
//! # Example Usage
//!
//! ```ignore
//! use siteprobe::crawl::{CrawlOptions, CrawlQueue, HttpVisitor, RouteCrawler};
//! use siteprobe::routes::CoverageTracker;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn crawl(target: &str) -> anyhow::Result<()> {
//!     let options = CrawlOptions::new().with_max_pages(25);
//!     let tracker = CoverageTracker::new(Default::default(), options.max_per_pattern);
//!     let queue = CrawlQueue::new("audit-1", options.max_depth, options.max_queue_size);
//!     let visitor = Arc::new(HttpVisitor::new(Duration::from_secs(30))?);
//!
//!     let mut crawler = RouteCrawler::new(visitor, tracker, queue, options)?;
//!     let summary = crawler.crawl(target).await?;
//!     println!("visited {} pages", summary.pages_visited);
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`routes`]: URL canonicalization and coverage tracking
//! - [`crawl`]: persistent queue, BFS crawler and visitor collaborators
//! - [`pipeline`]: phase registry, orchestrator, budgets and checkpoints
//! - [`findings`]: finding schema, aggregation and verification
//! - [`progress`]: injected progress reporting
//! - [`persist`]: atomic JSON persistence helpers

// Public modules
pub mod cli;
pub mod config;
pub mod crawl;
pub mod findings;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod routes;
pub mod util;

// Re-export key types for convenient access
pub use config::{ConfigError, SiteprobeConfig};
pub use crawl::{
    CrawlOptions, CrawlQueue, CrawlSummary, HttpVisitor, PageVisitor, RouteCrawler, StopReason,
};
pub use findings::{
    Finding, FindingAggregator, FindingVerifier, RawFinding, Severity, VerificationStatus,
};
pub use pipeline::{
    AuditContext, AuditOrchestrator, AuditReport, CheckpointManager, PhaseExecutor, PhaseId,
    PhaseRegistry,
};
pub use routes::{CanonicalUrl, CanonicalizeOptions, CoverageTracker, UrlCanonicalizer};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_siteprobe() {
        assert_eq!(NAME, "siteprobe");
    }
}
