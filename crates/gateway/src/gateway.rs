//! Dispatch layer: validates a request, routes it to the executor for its
//! language, and logs the outcome with a per-execution id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sandbox::{
    validate_code, validate_variables, ExecutionOutput, ExecutionRequest, Executor, Language,
    SecurityPolicy,
};
use sandbox_js::{ContextLimits, JsExecutor};
use sandbox_py::PyExecutor;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};

pub struct SandboxGateway {
    js: JsExecutor,
    py: PyExecutor,
    timeout: Duration,
}

impl SandboxGateway {
    /// Build both executors against a shared policy. Fails only if the
    /// Python interpreter cannot be resolved.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let policy = Arc::new(SecurityPolicy::builtin());
        let limits = ContextLimits {
            memory_bytes: usize::try_from(config.memory_limit_mb)
                .map_err(|_| GatewayError::Config("memory_limit_mb out of range".into()))?
                .saturating_mul(1024 * 1024),
            max_delay: Duration::from_millis(config.max_delay_ms),
        };
        Ok(Self {
            js: JsExecutor::new(Arc::clone(&policy), limits),
            py: PyExecutor::new(policy, config.python_bin.clone())?,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Run one snippet to completion. Input validation happens here, before
    /// any context or process is created, so malformed requests fail without
    /// spending isolation resources.
    pub async fn execute(&self, request: &ExecutionRequest) -> GatewayResult<ExecutionOutput> {
        let id = Uuid::new_v4();
        let started = Instant::now();
        info!(id = %id, language = %request.language, "execution started");

        validate_code(&request.code)?;
        let variables = validate_variables(&request.variables)?;

        let executor: &dyn Executor = match request.language {
            Language::Javascript => &self.js,
            Language::Python => &self.py,
        };

        let result = executor.execute(&request.code, &variables, self.timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(output) => {
                info!(id = %id, duration_ms, log_bytes = output.log.len(), "execution finished");
            }
            Err(e) => {
                warn!(id = %id, duration_ms, error = %e, "execution failed");
            }
        }
        Ok(result?)
    }
}
