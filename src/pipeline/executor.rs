//! External phase-executor collaborator
//!
//! Delegated phases (code analysis, form testing, responsive testing) are
//! judgment work performed outside this crate. The orchestrator hands the
//! executor a prompt and the prior phases' artifacts and gets back structured
//! output plus a cost signal for budget accounting.

use super::registry::PhaseId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the executor collaborator itself, distinct from a phase
/// producing a negative result.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("executor API error: {message}")]
    Api { message: String },

    #[error("executor request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("executor rate limited")]
    RateLimited,

    #[error("invalid executor response: {message}")]
    InvalidResponse { message: String },

    #[error("executor configuration error: {message}")]
    Configuration { message: String },

    #[error("network error: {message}")]
    Network { message: String },
}

/// Result of one delegated phase execution
#[derive(Debug, Clone)]
pub struct ExecutorResponse {
    pub success: bool,
    pub output: Value,
    pub cost: f64,
    pub error: Option<String>,
}

impl ExecutorResponse {
    pub fn success(output: Value, cost: f64) -> Self {
        Self {
            success: true,
            output,
            cost,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, cost: f64) -> Self {
        Self {
            success: false,
            output: Value::Null,
            cost,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    async fn execute(
        &self,
        phase: PhaseId,
        prompt: &str,
        context: &Value,
    ) -> Result<ExecutorResponse, ExecutorError>;

    fn name(&self) -> &str;
}

/// Executor used when no external executor is wired up. Delegated phases fail
/// with a configuration error and degrade per their criticality.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExecutor;

#[async_trait]
impl PhaseExecutor for UnavailableExecutor {
    async fn execute(
        &self,
        phase: PhaseId,
        _prompt: &str,
        _context: &Value,
    ) -> Result<ExecutorResponse, ExecutorError> {
        Err(ExecutorError::Configuration {
            message: format!("no phase executor configured for {phase}"),
        })
    }

    fn name(&self) -> &str {
        "UnavailableExecutor"
    }
}

/// Scripted executor for tests: per-phase responses or errors, with a record
/// of every call made.
pub struct MockExecutor {
    responses: Mutex<HashMap<PhaseId, Result<ExecutorResponse, ExecutorError>>>,
    calls: Mutex<Vec<PhaseId>>,
    default_cost: f64,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            default_cost: 1.0,
        }
    }

    pub fn with_response(self, phase: PhaseId, response: ExecutorResponse) -> Self {
        self.responses.lock().unwrap().insert(phase, Ok(response));
        self
    }

    pub fn with_error(self, phase: PhaseId, error: ExecutorError) -> Self {
        self.responses.lock().unwrap().insert(phase, Err(error));
        self
    }

    pub fn calls(&self) -> Vec<PhaseId> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PhaseExecutor for MockExecutor {
    async fn execute(
        &self,
        phase: PhaseId,
        _prompt: &str,
        _context: &Value,
    ) -> Result<ExecutorResponse, ExecutorError> {
        self.calls.lock().unwrap().push(phase);
        match self.responses.lock().unwrap().get(&phase) {
            Some(scripted) => scripted.clone(),
            None => Ok(ExecutorResponse::success(
                serde_json::json!({}),
                self.default_cost,
            )),
        }
    }

    fn name(&self) -> &str {
        "MockExecutor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_returns_scripted_response() {
        let executor = MockExecutor::new().with_response(
            PhaseId::FormTesting,
            ExecutorResponse::success(serde_json::json!({"findings": []}), 4.2),
        );
        let response = executor
            .execute(PhaseId::FormTesting, "test forms", &Value::Null)
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.cost, 4.2);
        assert_eq!(executor.calls(), vec![PhaseId::FormTesting]);
    }

    #[tokio::test]
    async fn mock_defaults_to_empty_success() {
        let executor = MockExecutor::new();
        let response = executor
            .execute(PhaseId::CodeAnalysis, "analyze", &Value::Null)
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.cost, 1.0);
    }

    #[tokio::test]
    async fn unavailable_executor_errors_with_configuration() {
        let executor = UnavailableExecutor;
        let error = executor
            .execute(PhaseId::FormTesting, "x", &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(error, ExecutorError::Configuration { .. }));
    }
}
