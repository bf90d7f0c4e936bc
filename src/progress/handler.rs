//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while an audit runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Audit pipeline started
    AuditStarted { audit_id: String, target: String },

    /// A pipeline phase began executing
    PhaseStarted { phase: String },

    /// A pipeline phase finished successfully
    PhaseCompleted {
        phase: String,
        duration: Duration,
        cost: f64,
    },

    /// A non-critical phase failed or was refused and the run continues
    PhaseSkipped { phase: String, reason: String },

    /// One page was visited during exploration
    PageVisited {
        url: String,
        depth: u32,
        status_code: Option<u16>,
        load_time: Duration,
        new_links: usize,
    },

    /// The exploration crawl ended
    CrawlFinished {
        pages_visited: usize,
        route_patterns: usize,
        stop_reason: String,
    },

    /// One reproduction attempt finished during verification
    VerificationAttempt {
        finding_id: String,
        attempt: u32,
        reproduced: bool,
    },

    /// Audit pipeline completed
    AuditCompleted { total_time: Duration },

    /// Audit pipeline failed
    AuditFailed { error: String },
}

/// Trait for handling progress events during an audit
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {
        // Intentionally empty
    }
}
