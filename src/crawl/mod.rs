//! Crawl queue, BFS driver and page-visitor collaborators

pub mod crawler;
pub mod queue;
pub mod visitor;

pub use crawler::{CrawlOptions, CrawlSummary, RouteCrawler, StopReason};
pub use queue::{CrawlQueue, EnqueueOptions, QueueEntry, QueueSnapshot, QueueStats};
pub use visitor::{HttpVisitor, MockVisitor, PageVisit, PageVisitor};
