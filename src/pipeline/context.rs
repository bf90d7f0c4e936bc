//! Audit context for managing dependencies
//!
//! Owns the long-lived collaborators and the artifact map that phases read
//! from and write to. Everything is injected at construction; there is no
//! process-global state.

use super::executor::{PhaseExecutor, UnavailableExecutor};
use super::registry::{PhaseRegistry, PhaseSpec};
use crate::crawl::{CrawlOptions, PageVisitor};
use crate::findings::{Reproducer, VerifyOptions};
use crate::progress::{NoOpHandler, ProgressHandler};
use crate::routes::CanonicalizeOptions;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub struct AuditContext {
    pub audit_id: String,
    pub target_url: String,
    pub state_dir: PathBuf,
    pub codebase_path: Option<PathBuf>,

    pub visitor: Arc<dyn PageVisitor>,
    pub executor: Arc<dyn PhaseExecutor>,
    pub reproducer: Arc<dyn Reproducer>,
    pub progress: Arc<dyn ProgressHandler>,

    pub crawl_options: CrawlOptions,
    pub verify_options: VerifyOptions,
    pub canonical_options: CanonicalizeOptions,

    /// Output artifacts by declared name, one entry per produced artifact
    pub artifacts: HashMap<String, Value>,
}

impl AuditContext {
    pub fn new(
        target_url: impl Into<String>,
        state_dir: impl Into<PathBuf>,
        visitor: Arc<dyn PageVisitor>,
        reproducer: Arc<dyn Reproducer>,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4().to_string(),
            target_url: target_url.into(),
            state_dir: state_dir.into(),
            codebase_path: None,
            visitor,
            executor: Arc::new(UnavailableExecutor),
            reproducer,
            progress: Arc::new(NoOpHandler),
            crawl_options: CrawlOptions::default(),
            verify_options: VerifyOptions::default(),
            canonical_options: CanonicalizeOptions::default(),
            artifacts: HashMap::new(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn PhaseExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_codebase_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.codebase_path = Some(path.into());
        self
    }

    pub fn with_crawl_options(mut self, options: CrawlOptions) -> Self {
        self.crawl_options = options;
        self
    }

    pub fn with_verify_options(mut self, options: VerifyOptions) -> Self {
        self.verify_options = options;
        self
    }

    pub fn with_canonical_options(mut self, options: CanonicalizeOptions) -> Self {
        self.canonical_options = options;
        self
    }

    pub fn with_audit_id(mut self, audit_id: impl Into<String>) -> Self {
        self.audit_id = audit_id.into();
        self
    }

    pub fn artifact(&self, name: &str) -> Option<&Value> {
        self.artifacts.get(name)
    }

    pub fn set_artifact(&mut self, name: impl Into<String>, value: Value) {
        self.artifacts.insert(name.into(), value);
    }

    /// Snapshot of all artifacts, stored in the checkpoint for resume.
    pub fn artifact_snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .artifacts
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }

    pub fn restore_artifacts(&mut self, snapshot: &Value) {
        if let Value::Object(map) = snapshot {
            for (key, value) in map {
                self.artifacts.insert(key.clone(), value.clone());
            }
        }
    }

    /// Context object handed to the external executor for a delegated phase:
    /// run identity plus the artifacts of the phase's direct dependencies.
    pub fn assemble_for(&self, spec: &PhaseSpec, registry: &PhaseRegistry) -> Value {
        let mut artifacts = Map::new();
        for dep in spec.deps {
            if let Some(dep_spec) = registry.spec(*dep) {
                for name in dep_spec.artifacts {
                    if let Some(value) = self.artifacts.get(*name) {
                        artifacts.insert((*name).to_string(), value.clone());
                    }
                }
            }
        }
        serde_json::json!({
            "audit_id": self.audit_id,
            "target_url": self.target_url,
            "codebase_path": self.codebase_path.as_ref().map(|p| p.display().to_string()),
            "artifacts": Value::Object(artifacts),
        })
    }
}
