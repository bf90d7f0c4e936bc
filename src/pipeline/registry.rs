//! Static phase registry
//!
//! The audit pipeline is a fixed DAG of named phases. The registry is
//! configuration, not runtime state: it is validated once at startup and a
//! cyclic or unknown-dependency table fails fast before any side effects.

use super::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseId {
    Preflight,
    CodeAnalysis,
    ProgressInit,
    Exploration,
    FormTesting,
    ResponsiveTesting,
    Aggregation,
    Verification,
    Summary,
}

impl PhaseId {
    pub const ALL: [PhaseId; 9] = [
        PhaseId::Preflight,
        PhaseId::CodeAnalysis,
        PhaseId::ProgressInit,
        PhaseId::Exploration,
        PhaseId::FormTesting,
        PhaseId::ResponsiveTesting,
        PhaseId::Aggregation,
        PhaseId::Verification,
        PhaseId::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseId::Preflight => "preflight",
            PhaseId::CodeAnalysis => "code-analysis",
            PhaseId::ProgressInit => "progress-init",
            PhaseId::Exploration => "exploration",
            PhaseId::FormTesting => "form-testing",
            PhaseId::ResponsiveTesting => "responsive-testing",
            PhaseId::Aggregation => "aggregation",
            PhaseId::Verification => "verification",
            PhaseId::Summary => "summary",
        }
    }

    pub fn parse(value: &str) -> Option<PhaseId> {
        PhaseId::ALL.iter().copied().find(|p| p.as_str() == value)
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a phase executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// Runs in-process
    Pure,
    /// Delegated to the external phase executor
    Delegated { needs_browser: bool },
}

/// Static description of one phase
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub id: PhaseId,
    pub pipeline_order: u32,
    pub kind: PhaseKind,
    pub deps: &'static [PhaseId],
    pub artifacts: &'static [&'static str],
    /// Cost ceiling for this phase, in executor cost units
    pub budget_ceiling: f64,
    /// Phases sharing a tag may run concurrently once their deps are met
    pub parallel_group: Option<&'static str>,
    /// Critical phases halt the run on failure; others degrade gracefully
    pub critical: bool,
}

pub struct PhaseRegistry {
    specs: Vec<PhaseSpec>,
}

impl PhaseRegistry {
    /// The fixed audit pipeline.
    pub fn standard() -> Self {
        Self {
            specs: vec![
                PhaseSpec {
                    id: PhaseId::Preflight,
                    pipeline_order: 1,
                    kind: PhaseKind::Pure,
                    deps: &[],
                    artifacts: &["preflight"],
                    budget_ceiling: 0.0,
                    parallel_group: None,
                    critical: true,
                },
                PhaseSpec {
                    id: PhaseId::CodeAnalysis,
                    pipeline_order: 2,
                    kind: PhaseKind::Delegated {
                        needs_browser: false,
                    },
                    deps: &[PhaseId::Preflight],
                    artifacts: &["code_analysis"],
                    budget_ceiling: 20.0,
                    parallel_group: None,
                    critical: false,
                },
                PhaseSpec {
                    id: PhaseId::ProgressInit,
                    pipeline_order: 3,
                    kind: PhaseKind::Pure,
                    deps: &[PhaseId::Preflight],
                    artifacts: &["known_routes"],
                    budget_ceiling: 0.0,
                    parallel_group: None,
                    critical: true,
                },
                PhaseSpec {
                    id: PhaseId::Exploration,
                    pipeline_order: 4,
                    kind: PhaseKind::Pure,
                    deps: &[PhaseId::ProgressInit],
                    artifacts: &["crawl_summary", "coverage", "exploration_findings"],
                    budget_ceiling: 0.0,
                    parallel_group: None,
                    critical: true,
                },
                PhaseSpec {
                    id: PhaseId::FormTesting,
                    pipeline_order: 5,
                    kind: PhaseKind::Delegated { needs_browser: true },
                    deps: &[PhaseId::Exploration],
                    artifacts: &["form_findings"],
                    budget_ceiling: 25.0,
                    parallel_group: Some("interaction"),
                    critical: false,
                },
                PhaseSpec {
                    id: PhaseId::ResponsiveTesting,
                    pipeline_order: 6,
                    kind: PhaseKind::Delegated { needs_browser: true },
                    deps: &[PhaseId::Exploration],
                    artifacts: &["responsive_findings"],
                    budget_ceiling: 25.0,
                    parallel_group: Some("interaction"),
                    critical: false,
                },
                PhaseSpec {
                    id: PhaseId::Aggregation,
                    pipeline_order: 7,
                    kind: PhaseKind::Pure,
                    deps: &[PhaseId::Exploration],
                    artifacts: &["findings", "finding_summary"],
                    budget_ceiling: 0.0,
                    parallel_group: None,
                    critical: true,
                },
                PhaseSpec {
                    id: PhaseId::Verification,
                    pipeline_order: 8,
                    kind: PhaseKind::Pure,
                    deps: &[PhaseId::Aggregation],
                    artifacts: &["verified_findings"],
                    budget_ceiling: 0.0,
                    parallel_group: None,
                    critical: false,
                },
                PhaseSpec {
                    id: PhaseId::Summary,
                    pipeline_order: 9,
                    kind: PhaseKind::Pure,
                    deps: &[PhaseId::Verification],
                    artifacts: &["audit_summary"],
                    budget_ceiling: 0.0,
                    parallel_group: None,
                    critical: true,
                },
            ],
        }
    }

    #[cfg(test)]
    pub fn from_specs(specs: Vec<PhaseSpec>) -> Self {
        Self { specs }
    }

    pub fn spec(&self, id: PhaseId) -> Option<&PhaseSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    pub fn specs(&self) -> &[PhaseSpec] {
        &self.specs
    }

    /// Validate the DAG: every dependency must exist in the table and no
    /// cycles are allowed.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let ids: HashSet<PhaseId> = self.specs.iter().map(|s| s.id).collect();
        for spec in &self.specs {
            for dep in spec.deps {
                if !ids.contains(dep) {
                    return Err(PipelineError::UnknownDependency {
                        phase: spec.id.as_str().to_string(),
                        dependency: dep.as_str().to_string(),
                    });
                }
            }
        }
        // Cycle check via iterative removal of dependency-free nodes
        self.execution_order().map(|_| ())
    }

    /// Topological order over the declared dependencies, with
    /// `pipeline_order` breaking ties.
    pub fn execution_order(&self) -> Result<Vec<PhaseId>, PipelineError> {
        let mut remaining: HashMap<PhaseId, HashSet<PhaseId>> = self
            .specs
            .iter()
            .map(|s| (s.id, s.deps.iter().copied().collect()))
            .collect();
        let mut order = Vec::with_capacity(self.specs.len());

        while !remaining.is_empty() {
            let mut ready: Vec<PhaseId> = remaining
                .iter()
                .filter(|(_, deps)| deps.iter().all(|d| !remaining.contains_key(d)))
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                let mut cycle: Vec<&str> =
                    remaining.keys().map(|id| id.as_str()).collect();
                cycle.sort_unstable();
                return Err(PipelineError::CyclicDependency {
                    phases: cycle.join(", "),
                });
            }
            ready.sort_by_key(|id| self.spec(*id).map(|s| s.pipeline_order).unwrap_or(u32::MAX));
            for id in ready {
                remaining.remove(&id);
                order.push(id);
            }
        }
        Ok(order)
    }

    /// The phase following `id` in pipeline order, if any.
    pub fn next_after(&self, id: PhaseId) -> Option<PhaseId> {
        let mut ordered: Vec<&PhaseSpec> = self.specs.iter().collect();
        ordered.sort_by_key(|s| s.pipeline_order);
        let pos = ordered.iter().position(|s| s.id == id)?;
        ordered.get(pos + 1).map(|s| s.id)
    }
}
