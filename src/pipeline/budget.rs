//! Cost budget accounting
//!
//! A phase is authorized only when the total budget can still cover its
//! declared ceiling; refusal happens before execution, so the run can never
//! silently overspend.

use super::registry::PhaseSpec;
use super::PipelineError;
use std::collections::HashMap;

#[derive(Debug)]
pub struct BudgetTracker {
    total_limit: f64,
    spent: f64,
    per_phase: HashMap<String, f64>,
}

impl BudgetTracker {
    pub fn new(total_limit: f64) -> Self {
        Self {
            total_limit,
            spent: 0.0,
            per_phase: HashMap::new(),
        }
    }

    /// Check that the phase may start without risking an overspend.
    pub fn authorize(&self, spec: &PhaseSpec) -> Result<(), PipelineError> {
        if self.spent >= self.total_limit {
            return Err(PipelineError::BudgetExceeded {
                phase: spec.id.as_str().to_string(),
                spent: self.spent,
                limit: self.total_limit,
            });
        }
        if self.spent + spec.budget_ceiling > self.total_limit {
            return Err(PipelineError::BudgetExceeded {
                phase: spec.id.as_str().to_string(),
                spent: self.spent,
                limit: self.total_limit,
            });
        }
        Ok(())
    }

    pub fn record(&mut self, spec: &PhaseSpec, cost: f64) {
        self.spent += cost;
        *self
            .per_phase
            .entry(spec.id.as_str().to_string())
            .or_insert(0.0) += cost;
        if cost > spec.budget_ceiling {
            tracing::warn!(
                phase = spec.id.as_str(),
                cost,
                ceiling = spec.budget_ceiling,
                "Phase cost exceeded its declared ceiling"
            );
        }
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn remaining(&self) -> f64 {
        (self.total_limit - self.spent).max(0.0)
    }

    pub fn phase_spend(&self, phase: &str) -> f64 {
        self.per_phase.get(phase).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::registry::{PhaseId, PhaseKind};

    fn spec(ceiling: f64) -> PhaseSpec {
        PhaseSpec {
            id: PhaseId::FormTesting,
            pipeline_order: 5,
            kind: PhaseKind::Delegated { needs_browser: true },
            deps: &[],
            artifacts: &[],
            budget_ceiling: ceiling,
            parallel_group: None,
            critical: false,
        }
    }

    #[test]
    fn authorize_within_budget() {
        let tracker = BudgetTracker::new(100.0);
        tracker.authorize(&spec(25.0)).unwrap();
    }

    #[test]
    fn refuses_when_ceiling_cannot_be_covered() {
        let mut tracker = BudgetTracker::new(30.0);
        tracker.record(&spec(25.0), 20.0);
        assert!(matches!(
            tracker.authorize(&spec(25.0)),
            Err(PipelineError::BudgetExceeded { .. })
        ));
    }

    #[test]
    fn refuses_once_fully_spent() {
        let mut tracker = BudgetTracker::new(10.0);
        tracker.record(&spec(25.0), 10.0);
        assert!(tracker.authorize(&spec(0.0)).is_err());
        assert_eq!(tracker.remaining(), 0.0);
    }

    #[test]
    fn records_per_phase_spend() {
        let mut tracker = BudgetTracker::new(100.0);
        tracker.record(&spec(25.0), 7.5);
        tracker.record(&spec(25.0), 2.5);
        assert_eq!(tracker.phase_spend("form-testing"), 10.0);
        assert_eq!(tracker.spent(), 10.0);
    }
}
