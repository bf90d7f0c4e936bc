//! Breadth-first route crawler
//!
//! Pulls from the persistent queue, delegates page retrieval to the injected
//! [`PageVisitor`], applies stop rules, and feeds newly discovered links back
//! through the canonicalizer, coverage tracker and queue. Single page at a
//! time with an inter-visit delay; no worker-pool parallelism, so load on the
//! target stays predictable.

use super::queue::{CrawlQueue, EnqueueOptions};
use super::visitor::PageVisitor;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::routes::{CoverageTracker, DiscoverySource};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::{Origin, Url};

/// Paths never crawled by default: session-ending links, API endpoints and
/// static assets.
const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    r"/log[-_]?out",
    r"/sign[-_]?out",
    r"/auth/",
    r"/api/",
    r"\.(?:css|js|mjs|map|png|jpe?g|gif|svg|ico|woff2?|ttf|eot|mp4|webm|pdf|zip|gz)(?:\?|$)",
];

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_pages: usize,
    pub max_route_patterns: usize,
    pub max_per_pattern: u32,
    pub timeout: Duration,
    pub rate_limit: Duration,
    pub same_origin_only: bool,
    pub exclude_patterns: Vec<String>,
    pub max_depth: u32,
    pub max_queue_size: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_route_patterns: 100,
            max_per_pattern: 3,
            timeout: Duration::from_secs(300),
            rate_limit: Duration::from_millis(500),
            same_origin_only: true,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            max_depth: 5,
            max_queue_size: 1000,
        }
    }
}

impl CrawlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_same_origin_only(mut self, same_origin_only: bool) -> Self {
        self.same_origin_only = same_origin_only;
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxPagesReached,
    MaxRoutePatternsReached,
    Timeout,
    QueueEmpty,
    Aborted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxPagesReached => "max_pages_reached",
            StopReason::MaxRoutePatternsReached => "max_route_patterns_reached",
            StopReason::Timeout => "timeout",
            StopReason::QueueEmpty => "queue_empty",
            StopReason::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub pages_visited: usize,
    pub route_patterns_found: usize,
    pub links_discovered: usize,
    pub errors: usize,
    pub stop_reason: StopReason,
    pub duration_ms: u64,
}

pub struct RouteCrawler {
    visitor: Arc<dyn PageVisitor>,
    tracker: CoverageTracker,
    queue: CrawlQueue,
    options: CrawlOptions,
    excludes: Vec<Regex>,
    abort: Arc<AtomicBool>,
    progress: Arc<dyn ProgressHandler>,
}

impl RouteCrawler {
    pub fn new(
        visitor: Arc<dyn PageVisitor>,
        tracker: CoverageTracker,
        queue: CrawlQueue,
        options: CrawlOptions,
    ) -> Result<Self> {
        let excludes = options
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid exclude pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            visitor,
            tracker,
            queue,
            options,
            excludes,
            abort: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(NoOpHandler),
        })
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = handler;
        self
    }

    /// Share an externally owned abort flag, e.g. the orchestrator's
    /// cancellation signal. Setting it stops the crawl at the next loop check.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = flag;
        self
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn tracker(&self) -> &CoverageTracker {
        &self.tracker
    }

    pub fn queue(&self) -> &CrawlQueue {
        &self.queue
    }

    pub fn into_parts(self) -> (CoverageTracker, CrawlQueue) {
        (self.tracker, self.queue)
    }

    pub async fn crawl(&mut self, start_url: &str) -> Result<CrawlSummary> {
        let start = Url::parse(start_url)
            .with_context(|| format!("invalid start URL: {start_url}"))?;
        let origin = start.origin();

        let registration = self.tracker.register(start_url, "GET")?;
        self.queue.enqueue(
            start_url,
            &registration.route_id,
            EnqueueOptions::new()
                .with_priority(100)
                .with_source(DiscoverySource::UserSpecified),
        );

        let started_at = Instant::now();
        let mut pages_visited = 0usize;
        let mut links_discovered = 0usize;
        let mut errors = 0usize;
        let mut first_visit = true;

        let stop_reason = loop {
            if self.abort.load(Ordering::Relaxed) {
                break StopReason::Aborted;
            }
            if pages_visited >= self.options.max_pages {
                break StopReason::MaxPagesReached;
            }
            if started_at.elapsed() >= self.options.timeout {
                break StopReason::Timeout;
            }
            if self.tracker.discovered_count() >= self.options.max_route_patterns {
                break StopReason::MaxRoutePatternsReached;
            }
            let Some(entry) = self.queue.dequeue() else {
                break StopReason::QueueEmpty;
            };
            // The same URL can be queued twice before either copy is
            // processed; the visited set closes that race here.
            if self.queue.has_visited(&entry.url) {
                continue;
            }
            let registration = self.tracker.register(&entry.url, "GET")?;
            if !registration.should_visit {
                debug!(url = %entry.url, "Route visit cap reached, skipping");
                self.queue.mark_skipped(&entry.url);
                continue;
            }

            if !first_visit && !self.options.rate_limit.is_zero() {
                tokio::time::sleep(self.options.rate_limit).await;
            }
            first_visit = false;

            let visit = self.visitor.visit(&entry.url, entry.depth).await;
            self.queue.mark_visited(&entry.url);
            self.tracker.record_visit(&entry.url, "GET")?;
            pages_visited += 1;

            self.progress.on_progress(&ProgressEvent::PageVisited {
                url: entry.url.clone(),
                depth: entry.depth,
                status_code: visit.status_code,
                load_time: visit.load_time,
                new_links: visit.discovered_links.len(),
            });

            if let Some(error) = &visit.error {
                warn!(url = %entry.url, error = %error, "Page visit failed");
                self.queue.mark_failed(&entry.url);
                errors += 1;
                continue;
            }

            links_discovered += visit.discovered_links.len();
            if entry.depth < self.options.max_depth {
                self.enqueue_discovered(&entry.url, entry.depth, &origin, &visit.discovered_links);
            }
        };

        let summary = CrawlSummary {
            pages_visited,
            route_patterns_found: self.tracker.discovered_count(),
            links_discovered,
            errors,
            stop_reason,
            duration_ms: started_at.elapsed().as_millis() as u64,
        };
        self.progress.on_progress(&ProgressEvent::CrawlFinished {
            pages_visited: summary.pages_visited,
            route_patterns: summary.route_patterns_found,
            stop_reason: stop_reason.as_str().to_string(),
        });
        Ok(summary)
    }

    fn enqueue_discovered(
        &mut self,
        parent_url: &str,
        parent_depth: u32,
        origin: &Origin,
        links: &[String],
    ) {
        let base = match Url::parse(parent_url) {
            Ok(base) => base,
            Err(_) => return,
        };
        for link in links {
            let Some(normalized) = self.normalize_link(&base, origin, link) else {
                continue;
            };
            let registration = match self.tracker.register(&normalized, "GET") {
                Ok(registration) => registration,
                Err(error) => {
                    debug!(link = %normalized, error = %error, "Skipping uncanonicalizable link");
                    continue;
                }
            };
            if !registration.should_visit {
                continue;
            }
            self.queue.enqueue(
                &normalized,
                &registration.route_id,
                EnqueueOptions::new()
                    .with_priority(50)
                    .with_depth(parent_depth + 1)
                    .with_source(DiscoverySource::LinkDiscovery)
                    .with_parent_url(parent_url),
            );
        }
    }

    /// Resolve and filter one discovered link. Returns the normalized URL
    /// (fragment stripped, trailing slash collapsed, query kept) or None when
    /// the link is out of scope.
    fn normalize_link(&self, base: &Url, origin: &Origin, link: &str) -> Option<String> {
        let mut resolved = base.join(link).ok()?;
        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }
        if self.options.same_origin_only && resolved.origin() != *origin {
            return None;
        }
        resolved.set_fragment(None);
        let path = resolved.path();
        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/').to_string();
            resolved.set_path(&trimmed);
        }
        let candidate = resolved.to_string();
        if self.excludes.iter().any(|re| re.is_match(&candidate)) {
            return None;
        }
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::visitor::MockVisitor;
    use crate::routes::CanonicalizeOptions;

    fn crawler_with(visitor: MockVisitor, options: CrawlOptions) -> RouteCrawler {
        let tracker = CoverageTracker::new(CanonicalizeOptions::default(), options.max_per_pattern);
        let queue = CrawlQueue::new("test-audit", options.max_depth, options.max_queue_size);
        RouteCrawler::new(Arc::new(visitor), tracker, queue, options).unwrap()
    }

    fn fast_options() -> CrawlOptions {
        CrawlOptions::new().with_rate_limit(Duration::ZERO)
    }

    /// A site where page N links to page N+1, deep enough to outlast any
    /// page budget under test.
    fn chain_site(length: usize) -> MockVisitor {
        let mut visitor = MockVisitor::new()
            .with_page("https://example.com/", vec!["https://example.com/s0".into()]);
        for i in 0..length {
            visitor = visitor.with_page(
                format!("https://example.com/s{i}"),
                vec![format!("https://example.com/s{}", i + 1)],
            );
        }
        visitor
    }

    #[tokio::test]
    async fn stops_at_max_pages() {
        let mut crawler = crawler_with(chain_site(20), fast_options().with_max_pages(5));

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        assert_eq!(summary.pages_visited, 5);
        assert_eq!(summary.stop_reason, StopReason::MaxPagesReached);
    }

    #[tokio::test]
    async fn self_links_do_not_cause_revisits() {
        let visitor = MockVisitor::new().with_page(
            "https://example.com/",
            vec![
                "https://example.com/".into(),
                "https://example.com/about".into(),
            ],
        );
        let mut crawler = crawler_with(visitor, fast_options());

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        assert_eq!(summary.pages_visited, 2);
        assert_eq!(summary.stop_reason, StopReason::QueueEmpty);
    }

    #[tokio::test]
    async fn rediscovery_from_multiple_parents_visits_once() {
        let visitor = MockVisitor::new()
            .with_page(
                "https://example.com/",
                vec![
                    "https://example.com/a".into(),
                    "https://example.com/b".into(),
                ],
            )
            .with_page(
                "https://example.com/a",
                vec!["https://example.com/shared".into()],
            )
            .with_page(
                "https://example.com/b",
                vec!["https://example.com/shared".into()],
            );
        let mut crawler = crawler_with(visitor, fast_options());

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        assert_eq!(summary.pages_visited, 4);
    }

    #[tokio::test]
    async fn cross_origin_links_are_not_visited() {
        let visitor = MockVisitor::new().with_page(
            "https://example.com/",
            vec![
                "https://evil.com/phish".into(),
                "https://example.com/safe".into(),
            ],
        );
        let mut crawler = crawler_with(visitor, fast_options());

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        assert_eq!(summary.pages_visited, 2);
        assert!(!crawler.queue().has_visited("https://evil.com/phish"));
    }

    #[tokio::test]
    async fn excluded_paths_are_skipped() {
        let visitor = MockVisitor::new().with_page(
            "https://example.com/",
            vec![
                "https://example.com/logout".into(),
                "https://example.com/api/users".into(),
                "https://example.com/styles.css".into(),
                "https://example.com/docs".into(),
            ],
        );
        let mut crawler = crawler_with(visitor, fast_options());

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        assert_eq!(summary.pages_visited, 2);
    }

    #[tokio::test]
    async fn visitor_errors_counted_but_crawl_continues() {
        let visitor = MockVisitor::new()
            .with_page(
                "https://example.com/",
                vec![
                    "https://example.com/broken".into(),
                    "https://example.com/fine".into(),
                ],
            )
            .with_failure("https://example.com/broken", "HTTP 500");
        let mut crawler = crawler_with(visitor, fast_options());

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.pages_visited, 3);
        assert!(crawler.queue().has_visited("https://example.com/broken"));
        assert!(crawler.queue().has_failed("https://example.com/broken"));
    }

    #[tokio::test]
    async fn abort_flag_stops_the_crawl() {
        let mut crawler = crawler_with(chain_site(20), fast_options());
        crawler.abort_flag().store(true, Ordering::Relaxed);

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        assert_eq!(summary.pages_visited, 0);
        assert_eq!(summary.stop_reason, StopReason::Aborted);
    }

    #[tokio::test]
    async fn per_pattern_cap_bounds_parameterized_routes() {
        let links: Vec<String> = (0..20)
            .map(|i| format!("https://example.com/items/{i}"))
            .collect();
        let visitor = MockVisitor::new().with_page("https://example.com/", links);
        let mut crawler = crawler_with(visitor, fast_options());

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        // Start page plus at most max_per_pattern item pages
        assert!(summary.pages_visited <= 1 + 3);
        assert_eq!(summary.route_patterns_found, 2);
    }

    #[tokio::test]
    async fn depth_limit_stops_link_expansion() {
        let visitor = MockVisitor::new()
            .with_page("https://example.com/", vec!["https://example.com/l1".into()])
            .with_page(
                "https://example.com/l1",
                vec!["https://example.com/l2".into()],
            )
            .with_page(
                "https://example.com/l2",
                vec!["https://example.com/l3".into()],
            );
        let mut options = fast_options();
        options.max_depth = 1;
        let mut crawler = crawler_with(visitor, options);

        let summary = crawler.crawl("https://example.com/").await.unwrap();
        // Depth 0 and 1 visited; l1's links are not expanded
        assert_eq!(summary.pages_visited, 2);
    }
}
