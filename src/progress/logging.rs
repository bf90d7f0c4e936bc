//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::AuditStarted { audit_id, target } => {
                info!(audit = %audit_id, target = %target, "Starting audit");
            }
            ProgressEvent::PhaseStarted { phase } => {
                info!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseCompleted {
                phase,
                duration,
                cost,
            } => {
                info!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    cost,
                    "Phase complete"
                );
            }
            ProgressEvent::PhaseSkipped { phase, reason } => {
                warn!(phase = %phase, reason = %reason, "Phase skipped");
            }
            ProgressEvent::PageVisited {
                url,
                depth,
                status_code,
                load_time,
                new_links,
            } => {
                debug!(
                    url = %url,
                    depth,
                    status = status_code.unwrap_or(0),
                    load_time_ms = load_time.as_millis(),
                    new_links,
                    "Visited page"
                );
            }
            ProgressEvent::CrawlFinished {
                pages_visited,
                route_patterns,
                stop_reason,
            } => {
                info!(
                    pages = pages_visited,
                    routes = route_patterns,
                    stop_reason = %stop_reason,
                    "Crawl finished"
                );
            }
            ProgressEvent::VerificationAttempt {
                finding_id,
                attempt,
                reproduced,
            } => {
                debug!(
                    finding = %finding_id,
                    attempt,
                    reproduced,
                    "Verification attempt"
                );
            }
            ProgressEvent::AuditCompleted { total_time } => {
                info!(total_time_ms = total_time.as_millis(), "Audit complete");
            }
            ProgressEvent::AuditFailed { error } => {
                warn!(error = %error, "Audit failed");
            }
        }
    }
}
