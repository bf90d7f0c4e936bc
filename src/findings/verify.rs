//! Reproducibility verification
//!
//! A candidate finding is re-attempted several times through the injected
//! [`Reproducer`]; the attempt record derives a verification status that
//! separates real bugs from flaky ones and broken verification tooling from
//! "could not reproduce".

use super::types::{Finding, Severity};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Result of one reproduction attempt by the collaborator
#[derive(Debug, Clone)]
pub struct ReproduceOutcome {
    pub reproduced: bool,
    pub error: Option<String>,
}

impl ReproduceOutcome {
    pub fn reproduced() -> Self {
        Self {
            reproduced: true,
            error: None,
        }
    }

    pub fn not_reproduced() -> Self {
        Self {
            reproduced: false,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            reproduced: false,
            error: Some(message.into()),
        }
    }
}

/// Collaborator that re-drives the flow a finding describes.
/// `fresh_context` requests a clean session to rule out state pollution.
#[async_trait]
pub trait Reproducer: Send + Sync {
    async fn reproduce(&self, finding: &Finding, fresh_context: bool) -> ReproduceOutcome;

    fn name(&self) -> &str;
}

/// Reproducer used when no reproduction collaborator is wired up. Attempts
/// surface as `VerificationError`, never as a silent "could not reproduce".
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReproducer;

#[async_trait]
impl Reproducer for NullReproducer {
    async fn reproduce(&self, _finding: &Finding, _fresh_context: bool) -> ReproduceOutcome {
        ReproduceOutcome::error("no reproducer configured")
    }

    fn name(&self) -> &str {
        "NullReproducer"
    }
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub max_attempts: u32,
    pub attempt_delay: Duration,
    /// Use a fresh context for the final attempt
    pub fresh_context_final: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_delay: Duration::from_secs(2),
            fresh_context_final: true,
        }
    }
}

impl VerifyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_attempt_delay(mut self, delay: Duration) -> Self {
        self.attempt_delay = delay;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Flaky,
    CouldNotReproduce,
    VerificationError,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Flaky => "flaky",
            VerificationStatus::CouldNotReproduce => "could_not_reproduce",
            VerificationStatus::VerificationError => "verification_error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub reproduced: bool,
    pub error: Option<String>,
}

/// A finding plus its verification evidence and adjusted severity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedFinding {
    pub finding: Finding,
    pub attempts: Vec<AttemptRecord>,
    pub status: VerificationStatus,
    pub final_severity: Severity,
    pub adjustment_reason: Option<String>,
    pub issue_worthy: bool,
    pub keep_in_report: bool,
}

pub struct FindingVerifier {
    reproducer: Arc<dyn Reproducer>,
    options: VerifyOptions,
    progress: Arc<dyn ProgressHandler>,
}

impl FindingVerifier {
    pub fn new(reproducer: Arc<dyn Reproducer>, options: VerifyOptions) -> Self {
        Self {
            reproducer,
            options,
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = handler;
        self
    }

    pub async fn verify(&self, finding: Finding) -> VerifiedFinding {
        let mut attempts = Vec::with_capacity(self.options.max_attempts as usize);
        for attempt in 1..=self.options.max_attempts {
            if attempt > 1 && !self.options.attempt_delay.is_zero() {
                tokio::time::sleep(self.options.attempt_delay).await;
            }
            let fresh_context =
                self.options.fresh_context_final && attempt == self.options.max_attempts;
            let outcome = self.reproducer.reproduce(&finding, fresh_context).await;
            debug!(
                finding = %finding.id,
                attempt,
                reproduced = outcome.reproduced,
                "Reproduction attempt finished"
            );
            self.progress
                .on_progress(&ProgressEvent::VerificationAttempt {
                    finding_id: finding.id.clone(),
                    attempt,
                    reproduced: outcome.reproduced,
                });
            attempts.push(AttemptRecord {
                attempt,
                reproduced: outcome.reproduced,
                error: outcome.error,
            });
        }

        let status = classify(&attempts);
        let (final_severity, adjustment_reason) = adjust_severity(finding.severity, status);
        let issue_worthy = is_issue_worthy(status, final_severity);
        let keep_in_report = match status {
            VerificationStatus::CouldNotReproduce => final_severity <= Severity::P1,
            _ => true,
        };

        VerifiedFinding {
            finding,
            attempts,
            status,
            final_severity,
            adjustment_reason,
            issue_worthy,
            keep_in_report,
        }
    }

    pub async fn verify_all(&self, findings: Vec<Finding>) -> Vec<VerifiedFinding> {
        let mut verified = Vec::with_capacity(findings.len());
        for finding in findings {
            verified.push(self.verify(finding).await);
        }
        verified
    }
}

/// Derive a status from the attempt list.
pub fn classify(attempts: &[AttemptRecord]) -> VerificationStatus {
    let total = attempts.len();
    let errors = attempts.iter().filter(|a| a.error.is_some()).count();
    let successes = attempts.iter().filter(|a| a.reproduced).count();

    if total > 0 && errors == total {
        VerificationStatus::VerificationError
    } else if successes == total && total > 0 {
        VerificationStatus::Verified
    } else if successes > 0 {
        VerificationStatus::Flaky
    } else {
        VerificationStatus::CouldNotReproduce
    }
}

fn adjust_severity(
    severity: Severity,
    status: VerificationStatus,
) -> (Severity, Option<String>) {
    match status {
        VerificationStatus::CouldNotReproduce => {
            let downgraded = severity.downgraded();
            if downgraded != severity {
                (
                    downgraded,
                    Some(format!(
                        "downgraded {severity} to {downgraded}: could not reproduce"
                    )),
                )
            } else {
                (severity, None)
            }
        }
        _ => (severity, None),
    }
}

fn is_issue_worthy(status: VerificationStatus, severity: Severity) -> bool {
    match status {
        VerificationStatus::Verified => severity <= Severity::P2,
        VerificationStatus::Flaky => severity <= Severity::P1,
        VerificationStatus::VerificationError => severity <= Severity::P1,
        VerificationStatus::CouldNotReproduce => false,
    }
}
