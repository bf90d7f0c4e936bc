//! Crash-safe pipeline checkpoints
//!
//! A checkpoint is written atomically after every phase transition and read
//! once at startup. Corruption is treated as absence: resume is refused with
//! a reason, never a crash, so a fresh run is always possible.

use super::registry::{PhaseId, PhaseRegistry};
use crate::persist::{atomic_write_json, read_json};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Durable record of pipeline progress. Phase ids are stored as strings so a
/// checkpoint from an unknown pipeline version is refused, not a parse crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub audit_id: String,
    pub last_completed_phase: String,
    pub completed_phases: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub resumable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_snapshot: Option<Value>,
}

/// Whether and where a run can resume
#[derive(Debug, Clone)]
pub struct ResumeDecision {
    pub can_resume: bool,
    pub reason: Option<String>,
    pub checkpoint: Option<Checkpoint>,
    pub next_phase: Option<PhaseId>,
}

impl ResumeDecision {
    fn refused(reason: impl Into<String>) -> Self {
        Self {
            can_resume: false,
            reason: Some(reason.into()),
            checkpoint: None,
            next_phase: None,
        }
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        atomic_write_json(&self.path(), checkpoint)
    }

    /// Decide whether a previous run can be resumed from this directory.
    pub fn check_resume(&self, registry: &PhaseRegistry) -> ResumeDecision {
        let path = self.path();
        if !path.exists() {
            return ResumeDecision::refused("no checkpoint found");
        }
        let checkpoint: Checkpoint = match read_json(&path) {
            Ok(checkpoint) => checkpoint,
            Err(error) => {
                return ResumeDecision::refused(format!("checkpoint unreadable: {error:#}"))
            }
        };
        if !checkpoint.resumable {
            return ResumeDecision::refused("checkpoint is marked not resumable");
        }
        let Some(last) = PhaseId::parse(&checkpoint.last_completed_phase) else {
            return ResumeDecision::refused(format!(
                "checkpoint records unknown phase: {}",
                checkpoint.last_completed_phase
            ));
        };
        let next_phase = registry.next_after(last);
        ResumeDecision {
            can_resume: true,
            reason: None,
            checkpoint: Some(checkpoint),
            next_phase,
        }
    }

    /// The phases a run should execute: the remaining suffix when resume is
    /// possible, otherwise the whole pipeline.
    pub fn phases_to_run(&self, registry: &PhaseRegistry) -> Result<Vec<PhaseId>> {
        let order = registry.execution_order()?;
        let decision = self.check_resume(registry);
        if !decision.can_resume {
            return Ok(order);
        }
        match decision.next_phase {
            Some(next) => {
                let pos = order.iter().position(|p| *p == next).unwrap_or(0);
                Ok(order[pos..].to_vec())
            }
            // Last phase already completed; nothing left to run
            None => Ok(Vec::new()),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
