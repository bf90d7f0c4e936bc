//! Audit pipeline orchestrator
//!
//! Runs the fixed phase DAG in dependency order: budget gate, pure or
//! delegated execution, artifact merge, then an atomic checkpoint after each
//! phase. Independent delegated phases sharing a parallel group run
//! concurrently over read-only snapshots of prior artifacts; their
//! checkpoints are still written in pipeline order.

use super::budget::BudgetTracker;
use super::checkpoint::{Checkpoint, CheckpointManager};
use super::context::AuditContext;
use super::phases;
use super::registry::{PhaseId, PhaseKind, PhaseRegistry, PhaseSpec};
use super::PipelineError;
use crate::progress::ProgressEvent;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRunStatus {
    Completed,
    Failed,
    Skipped,
}

/// One row in the audit report, per attempted phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PhaseId,
    pub status: PhaseRunStatus,
    pub cost: f64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub audit_id: String,
    pub resumed: bool,
    pub phases: Vec<PhaseRecord>,
    pub total_cost: f64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
}

pub struct AuditOrchestrator {
    registry: PhaseRegistry,
    checkpoints: CheckpointManager,
    budget: BudgetTracker,
    cancel: Arc<AtomicBool>,
}

impl AuditOrchestrator {
    pub fn new(
        registry: PhaseRegistry,
        checkpoints: CheckpointManager,
        total_budget: f64,
    ) -> Self {
        Self {
            registry,
            checkpoints,
            budget: BudgetTracker::new(total_budget),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned cancellation flag; checked before each phase
    /// and inside the crawl loop.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub async fn run(&mut self, ctx: &mut AuditContext) -> Result<AuditReport> {
        self.registry.validate()?;
        let started = Instant::now();

        let decision = self.checkpoints.check_resume(&self.registry);
        let mut completed: Vec<String> = Vec::new();
        let resumed = decision.can_resume;
        if let Some(checkpoint) = decision.checkpoint {
            if let Some(snapshot) = &checkpoint.state_snapshot {
                ctx.restore_artifacts(snapshot);
            }
            ctx.audit_id = checkpoint.audit_id.clone();
            completed = checkpoint.completed_phases;
            info!(
                audit = %ctx.audit_id,
                last = %checkpoint.last_completed_phase,
                "Resuming audit from checkpoint"
            );
        } else if let Some(reason) = decision.reason {
            info!(reason = %reason, "Starting fresh audit");
        }

        let to_run = self.checkpoints.phases_to_run(&self.registry)?;
        ctx.progress.on_progress(&ProgressEvent::AuditStarted {
            audit_id: ctx.audit_id.clone(),
            target: ctx.target_url.clone(),
        });

        let mut records = Vec::new();
        let mut index = 0;
        while index < to_run.len() {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(PipelineError::Cancelled.into());
            }

            let batch = self.parallel_batch(&to_run, index);
            if batch.len() > 1 {
                let batch_records = self
                    .run_parallel_batch(&batch, ctx, &mut completed)
                    .await?;
                records.extend(batch_records);
                index += batch.len();
            } else {
                let record = self.run_phase(to_run[index], ctx, &mut completed).await?;
                records.push(record);
                index += 1;
            }
        }

        let summary = ctx.artifact("audit_summary").cloned();
        ctx.progress.on_progress(&ProgressEvent::AuditCompleted {
            total_time: started.elapsed(),
        });

        Ok(AuditReport {
            audit_id: ctx.audit_id.clone(),
            resumed,
            phases: records,
            total_cost: self.budget.spent(),
            duration_ms: started.elapsed().as_millis() as u64,
            summary,
        })
    }

    /// Consecutive delegated phases sharing one parallel-group tag, starting
    /// at `index`. Anything else yields a batch of one.
    fn parallel_batch(&self, order: &[PhaseId], index: usize) -> Vec<PhaseId> {
        let first = order[index];
        let Some(first_spec) = self.registry.spec(first) else {
            return vec![first];
        };
        let Some(group) = first_spec.parallel_group else {
            return vec![first];
        };
        if !matches!(first_spec.kind, PhaseKind::Delegated { .. }) {
            return vec![first];
        }
        let mut batch = vec![first];
        for id in &order[index + 1..] {
            match self.registry.spec(*id) {
                Some(spec)
                    if spec.parallel_group == Some(group)
                        && matches!(spec.kind, PhaseKind::Delegated { .. }) =>
                {
                    batch.push(*id)
                }
                _ => break,
            }
        }
        batch
    }

    async fn run_phase(
        &mut self,
        id: PhaseId,
        ctx: &mut AuditContext,
        completed: &mut Vec<String>,
    ) -> Result<PhaseRecord> {
        let spec = self
            .registry
            .spec(id)
            .ok_or_else(|| anyhow!("phase {id} missing from registry"))?
            .clone();

        ctx.progress.on_progress(&ProgressEvent::PhaseStarted {
            phase: id.as_str().to_string(),
        });
        let started = Instant::now();

        if let Err(refusal) = self.budget.authorize(&spec) {
            return self.handle_failure(&spec, ctx, completed, started, 0.0, refusal.into());
        }

        let (result, cost) = match spec.kind {
            PhaseKind::Pure => (self.run_pure(id, ctx).await, 0.0),
            PhaseKind::Delegated { .. } => self.run_delegated(&spec, ctx).await,
        };
        self.budget.record(&spec, cost);

        match result {
            Ok(artifacts) => {
                self.complete_phase(&spec, artifacts, ctx, completed, started, cost)
            }
            Err(error) => self.handle_failure(&spec, ctx, completed, started, cost, error),
        }
    }

    async fn run_parallel_batch(
        &mut self,
        batch: &[PhaseId],
        ctx: &mut AuditContext,
        completed: &mut Vec<String>,
    ) -> Result<Vec<PhaseRecord>> {
        let mut specs = Vec::with_capacity(batch.len());
        for id in batch {
            specs.push(
                self.registry
                    .spec(*id)
                    .ok_or_else(|| anyhow!("phase {id} missing from registry"))?
                    .clone(),
            );
        }

        let started = Instant::now();
        let mut futures = Vec::new();
        let mut authorized = Vec::new();
        let mut records = Vec::new();
        for spec in &specs {
            ctx.progress.on_progress(&ProgressEvent::PhaseStarted {
                phase: spec.id.as_str().to_string(),
            });
            if let Err(refusal) = self.budget.authorize(spec) {
                records.push(self.handle_failure(
                    spec,
                    ctx,
                    completed,
                    started,
                    0.0,
                    refusal.into(),
                )?);
                continue;
            }
            let executor = Arc::clone(&ctx.executor);
            let prompt = prompt_for(spec.id, ctx);
            let context_value = ctx.assemble_for(spec, &self.registry);
            let id = spec.id;
            authorized.push(spec.clone());
            futures.push(async move {
                (id, executor.execute(id, &prompt, &context_value).await)
            });
        }

        // Barrier: all group members finish before any artifact merge or
        // checkpoint write, which then happen in pipeline order.
        let results = join_all(futures).await;
        for (spec, (id, outcome)) in authorized.iter().zip(results) {
            debug_assert_eq!(spec.id, id);
            let (result, cost) = flatten_executor_outcome(spec, outcome);
            self.budget.record(spec, cost);
            let record = match result {
                Ok(artifacts) => {
                    self.complete_phase(spec, artifacts, ctx, completed, started, cost)?
                }
                Err(error) => {
                    self.handle_failure(spec, ctx, completed, started, cost, error)?
                }
            };
            records.push(record);
        }
        Ok(records)
    }

    async fn run_pure(
        &self,
        id: PhaseId,
        ctx: &AuditContext,
    ) -> Result<phases::PhaseArtifacts> {
        match id {
            PhaseId::Preflight => phases::run_preflight(ctx),
            PhaseId::ProgressInit => phases::run_progress_init(ctx),
            PhaseId::Exploration => {
                phases::run_exploration(ctx, Arc::clone(&self.cancel)).await
            }
            PhaseId::Aggregation => phases::run_aggregation(ctx),
            PhaseId::Verification => phases::run_verification(ctx).await,
            PhaseId::Summary => phases::run_summary(ctx),
            other => Err(anyhow!("phase {other} is not a pure phase")),
        }
    }

    async fn run_delegated(
        &self,
        spec: &PhaseSpec,
        ctx: &AuditContext,
    ) -> (Result<phases::PhaseArtifacts>, f64) {
        let prompt = prompt_for(spec.id, ctx);
        let context_value = ctx.assemble_for(spec, &self.registry);
        let outcome = ctx
            .executor
            .execute(spec.id, &prompt, &context_value)
            .await;
        flatten_executor_outcome(spec, outcome)
    }

    fn complete_phase(
        &mut self,
        spec: &PhaseSpec,
        artifacts: phases::PhaseArtifacts,
        ctx: &mut AuditContext,
        completed: &mut Vec<String>,
        started: Instant,
        cost: f64,
    ) -> Result<PhaseRecord> {
        phases::persist_artifacts(&ctx.state_dir, &artifacts);
        for (name, value) in artifacts {
            ctx.set_artifact(name, value);
        }
        completed.push(spec.id.as_str().to_string());
        self.write_checkpoint(spec.id, ctx, completed)?;
        ctx.progress.on_progress(&ProgressEvent::PhaseCompleted {
            phase: spec.id.as_str().to_string(),
            duration: started.elapsed(),
            cost,
        });
        Ok(PhaseRecord {
            phase: spec.id,
            status: PhaseRunStatus::Completed,
            cost,
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
        })
    }

    /// Critical phases halt the run, leaving the last checkpoint intact;
    /// non-critical ones are logged and skipped.
    fn handle_failure(
        &mut self,
        spec: &PhaseSpec,
        ctx: &mut AuditContext,
        _completed: &mut Vec<String>,
        started: Instant,
        cost: f64,
        error: anyhow::Error,
    ) -> Result<PhaseRecord> {
        if spec.critical {
            ctx.progress.on_progress(&ProgressEvent::AuditFailed {
                error: format!("{error:#}"),
            });
            return Err(error.context(format!("critical phase {} failed", spec.id)));
        }
        warn!(phase = spec.id.as_str(), error = %format!("{error:#}"), "Non-critical phase failed, continuing");
        ctx.progress.on_progress(&ProgressEvent::PhaseSkipped {
            phase: spec.id.as_str().to_string(),
            reason: format!("{error:#}"),
        });
        Ok(PhaseRecord {
            phase: spec.id,
            status: PhaseRunStatus::Failed,
            cost,
            duration_ms: started.elapsed().as_millis() as u64,
            error: Some(format!("{error:#}")),
        })
    }

    fn write_checkpoint(
        &self,
        last: PhaseId,
        ctx: &AuditContext,
        completed: &[String],
    ) -> Result<()> {
        let checkpoint = Checkpoint {
            audit_id: ctx.audit_id.clone(),
            last_completed_phase: last.as_str().to_string(),
            completed_phases: completed.to_vec(),
            timestamp: Utc::now(),
            resumable: true,
            state_snapshot: Some(ctx.artifact_snapshot()),
        };
        self.checkpoints
            .save(&checkpoint)
            .context("failed to write checkpoint")
    }
}

/// Turn an executor outcome into phase artifacts plus the cost actually
/// incurred, including on failure.
fn flatten_executor_outcome(
    spec: &PhaseSpec,
    outcome: Result<super::executor::ExecutorResponse, super::executor::ExecutorError>,
) -> (Result<phases::PhaseArtifacts>, f64) {
    match outcome {
        Ok(response) if response.success => {
            let artifact_name = spec
                .artifacts
                .first()
                .copied()
                .unwrap_or(spec.id.as_str());
            (
                Ok(vec![(artifact_name.to_string(), response.output)]),
                response.cost,
            )
        }
        Ok(response) => {
            let message = response
                .error
                .unwrap_or_else(|| "executor reported failure".to_string());
            (Err(anyhow!(message)), response.cost)
        }
        Err(error) => (Err(error.into()), 0.0),
    }
}

fn prompt_for(id: PhaseId, ctx: &AuditContext) -> String {
    match id {
        PhaseId::CodeAnalysis => format!(
            "Analyze the application codebase{} and list its HTTP routes as \
             {{routes: [{{pattern, method, auth_required}}]}}, plus any findings \
             as {{findings: [...]}}.",
            ctx.codebase_path
                .as_ref()
                .map(|p| format!(" at {}", p.display()))
                .unwrap_or_default()
        ),
        PhaseId::FormTesting => format!(
            "Exercise the forms and interactive flows of {} discovered during \
             exploration. Report defects as {{findings: [...]}}.",
            ctx.target_url
        ),
        PhaseId::ResponsiveTesting => format!(
            "Check the explored pages of {} at mobile, tablet and desktop \
             viewport widths. Report layout defects as {{findings: [...]}}.",
            ctx.target_url
        ),
        other => format!("Execute the {other} phase."),
    }
}
