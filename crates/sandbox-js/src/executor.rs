use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rquickjs::{CatchResultExt, Context, Ctx, Function, Runtime, Value};
use sandbox::{
    Executor, ExecutionOutput, Language, Result, SandboxError, SecurityPolicy, Variables,
    ensure_object, validate_code,
};
use tracing::debug;

use crate::capabilities::{self, LogBuffer};

/// Resource budget for one execution context. The wall-clock timeout is
/// supplied per call by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    /// Hard heap ceiling for the context.
    pub memory_bytes: usize,
    /// Cap for the `delay` capability; always clamped below the timeout.
    pub max_delay: Duration,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 128 * 1024 * 1024,
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Runs JavaScript snippets inside an embedded QuickJS context.
///
/// Each call builds a fresh runtime on a blocking thread: the memory limit
/// bounds the heap, and an interrupt handler aborts evaluation once the
/// wall-clock deadline passes. The runtime is dropped on every exit path,
/// so no memory or state survives a call.
pub struct JsExecutor {
    policy: Arc<SecurityPolicy>,
    limits: ContextLimits,
}

impl JsExecutor {
    pub fn new(policy: Arc<SecurityPolicy>, limits: ContextLimits) -> Self {
        Self { policy, limits }
    }
}

#[async_trait]
impl Executor for JsExecutor {
    fn language(&self) -> Language {
        Language::Javascript
    }

    async fn execute(
        &self,
        code: &str,
        variables: &Variables,
        timeout: Duration,
    ) -> Result<ExecutionOutput> {
        validate_code(code)?;

        let code = code.to_owned();
        let variables = variables.clone();
        let policy = Arc::clone(&self.policy);
        let memory_bytes = self.limits.memory_bytes;
        let max_delay = self.limits.max_delay.min(timeout);

        // The QuickJS runtime is not Send; the whole execution lives on one
        // blocking thread while the async caller suspends on the handle.
        let handle = tokio::task::spawn_blocking(move || {
            run_isolated(&code, &variables, &policy, memory_bytes, max_delay, timeout)
        });

        handle
            .await
            .map_err(|e| SandboxError::Runtime(format!("context task failed: {e}")))?
    }
}

fn run_isolated(
    code: &str,
    variables: &Variables,
    policy: &SecurityPolicy,
    memory_bytes: usize,
    max_delay: Duration,
    timeout: Duration,
) -> Result<ExecutionOutput> {
    let runtime = Runtime::new().map_err(engine_error)?;
    runtime.set_memory_limit(memory_bytes);

    let deadline = Instant::now() + timeout;
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));

    let context = Context::full(&runtime).map_err(engine_error)?;
    let logs: LogBuffer = Rc::new(RefCell::new(Vec::new()));

    let outcome = context.with(|ctx| {
        run_snippet(&ctx, code, variables, policy, max_delay, Rc::clone(&logs))
    });

    // Context and runtime drop at end of scope on every path — success,
    // error, or interrupt — releasing the isolate's memory unconditionally.
    match outcome {
        Ok(value) => {
            let log = logs.borrow().join("\n");
            debug!(log_lines = logs.borrow().len(), "context execution finished");
            Ok(ExecutionOutput {
                code_return: ensure_object(value)?,
                log,
            })
        }
        Err(e) => Err(classify(e, deadline)),
    }
}

fn run_snippet<'js>(
    ctx: &Ctx<'js>,
    code: &str,
    variables: &Variables,
    policy: &SecurityPolicy,
    max_delay: Duration,
    logs: LogBuffer,
) -> Result<serde_json::Value> {
    capabilities::install(ctx, policy, max_delay, logs).map_err(engine_error)?;

    // Variables cross the boundary as JSON text, never as live host objects.
    let vars_json = serde_json::Value::Object(variables.clone()).to_string();
    let vars_js: Value = ctx.json_parse(vars_json).map_err(engine_error)?;

    ctx.eval::<(), _>(code.as_bytes())
        .catch(ctx)
        .map_err(|e| SandboxError::Runtime(e.to_string()))?;

    let globals = ctx.globals();
    let main: Function = globals
        .get("main")
        .map_err(|_| SandboxError::Runtime("No 'main' function defined".into()))?;
    let sandbox_ctx: Value = globals.get("__sb_context").map_err(engine_error)?;

    let returned: Value = main
        .call((vars_js, sandbox_ctx))
        .catch(ctx)
        .map_err(|e| SandboxError::Runtime(e.to_string()))?;

    // An async entry returns a Promise; drive the job queue until it
    // settles. A promise that can make no further progress never settles.
    let settled: Value = match returned.as_promise() {
        Some(promise) => {
            let promise = promise.clone();
            let finished = promise.finish::<Value>();
            if matches!(finished, Err(rquickjs::Error::WouldBlock)) {
                return Err(SandboxError::Runtime(
                    "entry function promise never settled".into(),
                ));
            }
            finished
                .catch(ctx)
                .map_err(|e| SandboxError::Runtime(e.to_string()))?
        }
        None => returned,
    };

    let json = match ctx.json_stringify(settled) {
        Ok(Some(text)) => text.to_string().map_err(engine_error)?,
        Ok(None) => {
            return Err(SandboxError::InvalidResponse(
                "entry function returned a non-serializable value".into(),
            ));
        }
        Err(_) => {
            return Err(SandboxError::InvalidResponse(
                "entry function return value is not JSON-serializable".into(),
            ));
        }
    };

    serde_json::from_str(&json)
        .map_err(|e| SandboxError::InvalidResponse(format!("unparseable return value: {e}")))
}

/// Interrupt and allocation failures surface as plain engine exceptions;
/// fold them into the timeout failure class when the deadline has passed or
/// the heap ceiling was hit.
fn classify(error: SandboxError, deadline: Instant) -> SandboxError {
    if Instant::now() >= deadline {
        return SandboxError::TimeoutOrKilled("wall-clock budget exceeded".into());
    }
    if let SandboxError::Runtime(msg) = &error
        && (msg.contains("out of memory") || msg.contains("llocation failed"))
    {
        return SandboxError::TimeoutOrKilled("memory ceiling exceeded".into());
    }
    error
}

fn engine_error(e: rquickjs::Error) -> SandboxError {
    SandboxError::Runtime(format!("js engine: {e}"))
}
