//! Persistent priority queue of pending crawl URLs
//!
//! Ordering is priority-then-discovery-order and stable: entries with equal
//! priority dequeue in the order they were enqueued. The queue is capacity
//! bounded; at capacity a new entry may only enter by evicting the current
//! minimum, and only with strictly higher priority.

use crate::persist::{atomic_write_json, read_json};
use crate::routes::DiscoverySource;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const QUEUE_SCHEMA_VERSION: u32 = 1;

/// A pending URL with its discovery metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub url: String,
    pub route_id: String,
    pub priority: i32,
    pub depth: u32,
    pub source: DiscoverySource,
    pub parent_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub retry_count: u32,
    seq: u64,
}

/// Discovery metadata supplied at enqueue time
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub priority: i32,
    pub depth: u32,
    pub source: DiscoverySource,
    pub parent_url: Option<String>,
    pub retry_count: u32,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 50,
            depth: 0,
            source: DiscoverySource::LinkDiscovery,
            parent_url: None,
            retry_count: 0,
        }
    }
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_source(mut self, source: DiscoverySource) -> Self {
        self.source = source;
        self
    }

    pub fn with_parent_url(mut self, parent: impl Into<String>) -> Self {
        self.parent_url = Some(parent.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Durable representation, the coverage queue file contract
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub schema_version: u32,
    pub audit_id: String,
    pub updated_at: DateTime<Utc>,
    pub pending: Vec<QueueEntry>,
    pub visited: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub stats: QueueStats,
}

pub struct CrawlQueue {
    audit_id: String,
    pending: Vec<QueueEntry>,
    pending_urls: HashSet<String>,
    visited: BTreeSet<String>,
    skipped: BTreeSet<String>,
    failed: BTreeSet<String>,
    max_depth: u32,
    max_size: usize,
    next_seq: u64,
    stats: QueueStats,
    persist_path: Option<PathBuf>,
}

impl CrawlQueue {
    pub fn new(audit_id: impl Into<String>, max_depth: u32, max_size: usize) -> Self {
        Self {
            audit_id: audit_id.into(),
            pending: Vec::new(),
            pending_urls: HashSet::new(),
            visited: BTreeSet::new(),
            skipped: BTreeSet::new(),
            failed: BTreeSet::new(),
            max_depth,
            max_size,
            next_seq: 0,
            stats: QueueStats::default(),
            persist_path: None,
        }
    }

    /// Persist the queue to `path` after every mutating call.
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Reconstruct a queue from a previously saved snapshot.
    pub fn load(path: &Path, max_depth: u32, max_size: usize) -> Result<Self> {
        let snapshot: QueueSnapshot = read_json(path)?;
        let mut pending = snapshot.pending;
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        let next_seq = pending.iter().map(|e| e.seq + 1).max().unwrap_or(0);
        let pending_urls = pending.iter().map(|e| e.url.clone()).collect();
        Ok(Self {
            audit_id: snapshot.audit_id,
            pending,
            pending_urls,
            visited: snapshot.visited.into_iter().collect(),
            skipped: snapshot.skipped.into_iter().collect(),
            failed: snapshot.failed.into_iter().collect(),
            max_depth,
            max_size,
            next_seq,
            stats: snapshot.stats,
            persist_path: Some(path.to_path_buf()),
        })
    }

    /// Add a URL to the queue. Returns false when rejected: already queued or
    /// already in visit history, beyond max depth, or the queue is full and
    /// the new priority does not beat the current minimum.
    pub fn enqueue(&mut self, url: &str, route_id: &str, options: EnqueueOptions) -> bool {
        if self.pending_urls.contains(url)
            || self.visited.contains(url)
            || self.skipped.contains(url)
        {
            self.stats.rejected += 1;
            return false;
        }
        if options.depth > self.max_depth {
            self.stats.rejected += 1;
            return false;
        }
        if self.pending.len() >= self.max_size {
            let min_priority = self.pending.last().map(|e| e.priority).unwrap_or(i32::MIN);
            if options.priority <= min_priority {
                self.stats.rejected += 1;
                return false;
            }
            if let Some(evicted) = self.pending.pop() {
                self.pending_urls.remove(&evicted.url);
                self.stats.evicted += 1;
            }
        }

        let entry = QueueEntry {
            url: url.to_string(),
            route_id: route_id.to_string(),
            priority: options.priority,
            depth: options.depth,
            source: options.source,
            parent_url: options.parent_url,
            discovered_at: Utc::now(),
            retry_count: options.retry_count,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.insert_sorted(entry);
        self.pending_urls.insert(url.to_string());
        self.stats.enqueued += 1;
        self.persist();
        true
    }

    pub fn bulk_enqueue<'a, I>(&mut self, urls: I, options: &EnqueueOptions) -> usize
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        urls.into_iter()
            .filter(|(url, route_id)| self.enqueue(url, route_id, options.clone()))
            .count()
    }

    pub fn dequeue(&mut self) -> Option<QueueEntry> {
        if self.pending.is_empty() {
            return None;
        }
        let entry = self.pending.remove(0);
        self.pending_urls.remove(&entry.url);
        self.stats.dequeued += 1;
        self.persist();
        Some(entry)
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        self.pending.first()
    }

    pub fn mark_visited(&mut self, url: &str) {
        self.remove_pending(url);
        self.visited.insert(url.to_string());
        self.persist();
    }

    pub fn mark_skipped(&mut self, url: &str) {
        self.remove_pending(url);
        self.skipped.insert(url.to_string());
        self.stats.skipped += 1;
        self.persist();
    }

    /// Record a failure. Visit history is preserved; only the pending entry
    /// is removed. Retries are new entries with `DiscoverySource::Retry`.
    pub fn mark_failed(&mut self, url: &str) {
        self.remove_pending(url);
        self.failed.insert(url.to_string());
        self.stats.failed += 1;
        self.persist();
    }

    pub fn reprioritize(&mut self, url: &str, new_priority: i32) -> bool {
        let Some(pos) = self.pending.iter().position(|e| e.url == url) else {
            return false;
        };
        let mut entry = self.pending.remove(pos);
        entry.priority = new_priority;
        self.insert_sorted(entry);
        self.persist();
        true
    }

    pub fn has_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn has_failed(&self, url: &str) -> bool {
        self.failed.contains(url)
    }

    pub fn is_queued(&self, url: &str) -> bool {
        self.pending_urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            schema_version: QUEUE_SCHEMA_VERSION,
            audit_id: self.audit_id.clone(),
            updated_at: Utc::now(),
            pending: self.pending.clone(),
            visited: self.visited.iter().cloned().collect(),
            skipped: self.skipped.iter().cloned().collect(),
            failed: self.failed.iter().cloned().collect(),
            stats: self.stats.clone(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, &self.snapshot())
    }

    /// Keep the vec sorted: priority descending, discovery order ascending.
    /// `partition_point` places equal priorities after existing ones, which
    /// preserves FIFO among equals.
    fn insert_sorted(&mut self, entry: QueueEntry) {
        let pos = self
            .pending
            .partition_point(|e| e.priority > entry.priority || (e.priority == entry.priority && e.seq < entry.seq));
        self.pending.insert(pos, entry);
    }

    fn remove_pending(&mut self, url: &str) {
        if self.pending_urls.remove(url) {
            self.pending.retain(|e| e.url != url);
        }
    }

    fn persist(&self) {
        if let Some(path) = &self.persist_path {
            if let Err(error) = self.save(path) {
                warn!(path = %path.display(), error = %error, "Failed to persist crawl queue");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts(priority: i32) -> EnqueueOptions {
        EnqueueOptions::new().with_priority(priority)
    }

    #[test]
    fn duplicate_enqueue_returns_false() {
        let mut queue = CrawlQueue::new("audit-1", 5, 100);
        assert!(queue.enqueue("https://example.com/a", "r1", opts(50)));
        assert!(!queue.enqueue("https://example.com/a", "r1", opts(50)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.stats().rejected, 1);
    }

    #[test]
    fn dequeue_in_priority_then_discovery_order() {
        let mut queue = CrawlQueue::new("audit-1", 5, 100);
        queue.enqueue("https://example.com/low", "r1", opts(10));
        queue.enqueue("https://example.com/high", "r2", opts(90));
        queue.enqueue("https://example.com/mid-a", "r3", opts(50));
        queue.enqueue("https://example.com/mid-b", "r4", opts(50));

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|e| e.url)
            .collect();
        assert_eq!(
            order,
            vec![
                "https://example.com/high",
                "https://example.com/mid-a",
                "https://example.com/mid-b",
                "https://example.com/low",
            ]
        );
    }

    #[test]
    fn beyond_max_depth_rejected() {
        let mut queue = CrawlQueue::new("audit-1", 2, 100);
        assert!(!queue.enqueue(
            "https://example.com/deep",
            "r1",
            opts(50).with_depth(3)
        ));
    }

    #[test]
    fn visited_url_rejected_on_enqueue() {
        let mut queue = CrawlQueue::new("audit-1", 5, 100);
        queue.mark_visited("https://example.com/seen");
        assert!(!queue.enqueue("https://example.com/seen", "r1", opts(50)));
    }

    #[test]
    fn capacity_eviction_requires_strictly_higher_priority() {
        let mut queue = CrawlQueue::new("audit-1", 5, 2);
        queue.enqueue("https://example.com/a", "r1", opts(10));
        queue.enqueue("https://example.com/b", "r2", opts(20));

        // Equal to the minimum: rejected
        assert!(!queue.enqueue("https://example.com/c", "r3", opts(10)));
        // Strictly higher: minimum is evicted
        assert!(queue.enqueue("https://example.com/d", "r4", opts(15)));
        assert_eq!(queue.len(), 2);
        assert!(!queue.is_queued("https://example.com/a"));
        assert_eq!(queue.stats().evicted, 1);
    }

    #[test]
    fn mark_skipped_removes_pending_but_keeps_history() {
        let mut queue = CrawlQueue::new("audit-1", 5, 100);
        queue.enqueue("https://example.com/a", "r1", opts(50));
        queue.mark_skipped("https://example.com/a");
        assert!(queue.is_empty());
        assert!(!queue.enqueue("https://example.com/a", "r1", opts(50)));
    }

    #[test]
    fn mark_failed_keeps_visit_history_queryable() {
        let mut queue = CrawlQueue::new("audit-1", 5, 100);
        queue.mark_visited("https://example.com/a");
        queue.mark_failed("https://example.com/a");
        assert!(queue.has_visited("https://example.com/a"));
        assert!(queue.has_failed("https://example.com/a"));
    }

    #[test]
    fn reprioritize_moves_entry() {
        let mut queue = CrawlQueue::new("audit-1", 5, 100);
        queue.enqueue("https://example.com/a", "r1", opts(90));
        queue.enqueue("https://example.com/b", "r2", opts(10));
        assert!(queue.reprioritize("https://example.com/b", 100));
        assert_eq!(queue.peek().unwrap().url, "https://example.com/b");
        assert!(!queue.reprioritize("https://example.com/missing", 5));
    }

    #[test]
    fn save_load_round_trip_preserves_order_and_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");

        let mut queue = CrawlQueue::new("audit-9", 5, 100);
        queue.enqueue("https://example.com/b", "r2", opts(50));
        queue.enqueue("https://example.com/a", "r1", opts(90));
        queue.mark_visited("https://example.com/seen");
        queue.mark_skipped("https://example.com/skipped");
        queue.save(&path).unwrap();

        let mut loaded = CrawlQueue::load(&path, 5, 100).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.has_visited("https://example.com/seen"));
        assert_eq!(loaded.dequeue().unwrap().url, "https://example.com/a");
        assert_eq!(loaded.dequeue().unwrap().url, "https://example.com/b");
        assert!(!loaded.enqueue("https://example.com/skipped", "r3", opts(50)));
    }

    #[test]
    fn autosave_writes_after_mutations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        let mut queue =
            CrawlQueue::new("audit-2", 5, 100).with_persist_path(path.clone());
        queue.enqueue("https://example.com/a", "r1", opts(50));
        assert!(path.exists());

        let snapshot: QueueSnapshot = crate::persist::read_json(&path).unwrap();
        assert_eq!(snapshot.schema_version, QUEUE_SCHEMA_VERSION);
        assert_eq!(snapshot.pending.len(), 1);
        assert_eq!(snapshot.audit_id, "audit-2");
    }
}
