//! Route registry and coverage accounting
//!
//! Owns the set of known and discovered route patterns plus per-pattern visit
//! counts, and answers "should this URL still be visited". The per-pattern cap
//! is what keeps a crawl from chasing every `/item/{itemId}` value forever.

use super::canonical::{CanonicalizeOptions, UrlCanonicalizer};
use super::DiscoverySource;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MAX_SAMPLE_URLS: usize = 5;

/// A logical route: a path template plus visit bookkeeping.
/// Created on first encounter, never deleted within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePattern {
    pub pattern: String,
    pub method: String,
    pub route_id: String,
    pub source: DiscoverySource,
    pub auth_required: bool,
    pub visit_count: u32,
    pub sample_urls: Vec<String>,
}

/// Outcome of registering a URL against the registry
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub is_new_route: bool,
    pub route_id: String,
    pub visit_count: u32,
    pub should_visit: bool,
}

/// Coverage numbers for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub discovered: usize,
    pub visited: usize,
    pub percent: f64,
    /// Routes found by crawling that the static analysis did not predict.
    /// Reported separately instead of letting percent exceed 100.
    pub beyond_expected: usize,
}

/// Serializable snapshot of the tracker, used in checkpoint state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageState {
    pub patterns: Vec<RoutePattern>,
    pub known_from_analysis: usize,
}

pub struct CoverageTracker {
    canonicalizer: UrlCanonicalizer,
    patterns: HashMap<String, RoutePattern>,
    known_from_analysis: usize,
    max_per_pattern: u32,
}

impl CoverageTracker {
    pub fn new(options: CanonicalizeOptions, max_per_pattern: u32) -> Self {
        Self {
            canonicalizer: UrlCanonicalizer::new(options),
            patterns: HashMap::new(),
            known_from_analysis: 0,
            max_per_pattern,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CanonicalizeOptions::default(), 3)
    }

    /// Seed a route known ahead of crawling, typically from code analysis.
    pub fn add_known_route(
        &mut self,
        pattern: &str,
        method: &str,
        source: DiscoverySource,
        auth_required: bool,
    ) {
        let route_id = self.pattern_route_id(method, pattern);
        if self.patterns.contains_key(&route_id) {
            return;
        }
        self.known_from_analysis += 1;
        self.patterns.insert(
            route_id.clone(),
            RoutePattern {
                pattern: pattern.to_string(),
                method: method.to_ascii_uppercase(),
                route_id,
                source,
                auth_required,
                visit_count: 0,
                sample_urls: Vec::new(),
            },
        );
    }

    /// Register a URL, creating its pattern on first encounter.
    /// `should_visit` turns false once the pattern hit its visit cap.
    pub fn register(&mut self, url: &str, method: &str) -> Result<RegisterOutcome> {
        let canonical = self.canonicalizer.canonicalize(url, method)?;
        let is_new_route = !self.patterns.contains_key(&canonical.route_id);
        let entry = self
            .patterns
            .entry(canonical.route_id.clone())
            .or_insert_with(|| RoutePattern {
                pattern: canonical.route_pattern.clone(),
                method: method.to_ascii_uppercase(),
                route_id: canonical.route_id.clone(),
                source: DiscoverySource::LinkDiscovery,
                auth_required: false,
                visit_count: 0,
                sample_urls: Vec::new(),
            });
        Ok(RegisterOutcome {
            is_new_route,
            route_id: canonical.route_id,
            visit_count: entry.visit_count,
            should_visit: entry.visit_count < self.max_per_pattern,
        })
    }

    /// Record a completed visit against the URL's pattern.
    pub fn record_visit(&mut self, url: &str, method: &str) -> Result<()> {
        let canonical = self.canonicalizer.canonicalize(url, method)?;
        if let Some(entry) = self.patterns.get_mut(&canonical.route_id) {
            entry.visit_count += 1;
            if entry.sample_urls.len() < MAX_SAMPLE_URLS {
                entry.sample_urls.push(canonical.canonical);
            }
        }
        Ok(())
    }

    /// Coverage over `max(known_from_analysis, discovered)`, never above 100%.
    pub fn coverage(&self) -> CoverageReport {
        let discovered = self.patterns.len();
        let visited = self
            .patterns
            .values()
            .filter(|p| p.visit_count > 0)
            .count();
        let denominator = self.known_from_analysis.max(discovered);
        let percent = if denominator == 0 {
            0.0
        } else {
            (visited as f64 / denominator as f64 * 100.0).min(100.0)
        };
        CoverageReport {
            discovered,
            visited,
            percent,
            beyond_expected: discovered.saturating_sub(self.known_from_analysis),
        }
    }

    pub fn unvisited_routes(&self) -> Vec<&RoutePattern> {
        let mut routes: Vec<&RoutePattern> = self
            .patterns
            .values()
            .filter(|p| p.visit_count == 0)
            .collect();
        routes.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        routes
    }

    pub fn discovered_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn canonicalizer(&self) -> &UrlCanonicalizer {
        &self.canonicalizer
    }

    pub fn snapshot(&self) -> CoverageState {
        let mut patterns: Vec<RoutePattern> = self.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        CoverageState {
            patterns,
            known_from_analysis: self.known_from_analysis,
        }
    }

    pub fn restore(&mut self, state: CoverageState) {
        self.known_from_analysis = state.known_from_analysis;
        self.patterns = state
            .patterns
            .into_iter()
            .map(|p| (p.route_id.clone(), p))
            .collect();
    }

    fn pattern_route_id(&self, method: &str, pattern: &str) -> String {
        use sha2::{Digest, Sha256};
        let input = format!("{}:{}", method.to_ascii_uppercase(), pattern);
        hex::encode(Sha256::digest(input.as_bytes()))[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_collapses_urls_onto_one_pattern() {
        let mut tracker = CoverageTracker::with_defaults();
        let first = tracker
            .register("https://example.com/users/1", "GET")
            .unwrap();
        let second = tracker
            .register("https://example.com/users/2", "GET")
            .unwrap();
        assert!(first.is_new_route);
        assert!(!second.is_new_route);
        assert_eq!(first.route_id, second.route_id);
        assert_eq!(tracker.discovered_count(), 1);
    }

    #[test]
    fn visit_cap_flips_should_visit() {
        let mut tracker = CoverageTracker::new(CanonicalizeOptions::default(), 3);
        for i in 0..3 {
            let url = format!("https://example.com/items/{i}");
            let outcome = tracker.register(&url, "GET").unwrap();
            assert!(outcome.should_visit, "visit {i} should be allowed");
            tracker.record_visit(&url, "GET").unwrap();
        }
        let outcome = tracker
            .register("https://example.com/items/999", "GET")
            .unwrap();
        assert!(!outcome.should_visit);
        assert_eq!(outcome.visit_count, 3);
    }

    #[test]
    fn coverage_percent_clamped_with_beyond_expected() {
        let mut tracker = CoverageTracker::with_defaults();
        tracker.add_known_route("/home", "GET", DiscoverySource::CodeAnalysis, false);

        for path in ["/home", "/about", "/pricing"] {
            let url = format!("https://example.com{path}");
            tracker.register(&url, "GET").unwrap();
            tracker.record_visit(&url, "GET").unwrap();
        }

        let report = tracker.coverage();
        assert_eq!(report.discovered, 3);
        assert_eq!(report.visited, 3);
        assert!(report.percent <= 100.0);
        assert_eq!(report.beyond_expected, 2);
    }

    #[test]
    fn coverage_of_empty_tracker_is_zero() {
        let tracker = CoverageTracker::with_defaults();
        let report = tracker.coverage();
        assert_eq!(report.percent, 0.0);
        assert_eq!(report.discovered, 0);
    }

    #[test]
    fn unvisited_routes_lists_known_but_not_crawled() {
        let mut tracker = CoverageTracker::with_defaults();
        tracker.add_known_route(
            "/admin/{userId}",
            "GET",
            DiscoverySource::CodeAnalysis,
            true,
        );
        tracker
            .register("https://example.com/home", "GET")
            .unwrap();
        tracker
            .record_visit("https://example.com/home", "GET")
            .unwrap();

        let unvisited = tracker.unvisited_routes();
        assert_eq!(unvisited.len(), 1);
        assert_eq!(unvisited[0].pattern, "/admin/{userId}");
        assert!(unvisited[0].auth_required);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut tracker = CoverageTracker::with_defaults();
        tracker
            .register("https://example.com/users/5", "GET")
            .unwrap();
        tracker
            .record_visit("https://example.com/users/5", "GET")
            .unwrap();

        let state = tracker.snapshot();
        let mut restored = CoverageTracker::with_defaults();
        restored.restore(state);
        assert_eq!(restored.discovered_count(), 1);
        assert_eq!(restored.coverage().visited, 1);
    }

    #[test]
    fn sample_urls_capped() {
        let mut tracker = CoverageTracker::new(CanonicalizeOptions::default(), 100);
        for i in 0..10 {
            let url = format!("https://example.com/users/{i}");
            tracker.register(&url, "GET").unwrap();
            tracker.record_visit(&url, "GET").unwrap();
        }
        let state = tracker.snapshot();
        assert_eq!(state.patterns[0].sample_urls.len(), MAX_SAMPLE_URLS);
    }
}
