#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use sandbox::{Executor, SandboxError, SecurityPolicy, Variables};
use sandbox_js::{ContextLimits, JsExecutor};
use serde_json::json;

fn executor() -> JsExecutor {
    JsExecutor::new(Arc::new(SecurityPolicy::builtin()), ContextLimits::default())
}

fn variables(value: serde_json::Value) -> Variables {
    sandbox::validate_variables(&value).unwrap()
}

const TIMEOUT: Duration = Duration::from_secs(10);

async fn run(code: &str, vars: serde_json::Value) -> sandbox::Result<sandbox::ExecutionOutput> {
    executor().execute(code, &variables(vars), TIMEOUT).await
}

#[tokio::test]
async fn sums_two_variables() {
    let out = run(
        "function main({x, y}) { return { sum: x + y } }",
        json!({"x": 5, "y": 3}),
    )
    .await
    .unwrap();
    assert_eq!(out.code_return, json!({"sum": 8}));
    assert_eq!(out.log, "");
}

#[tokio::test]
async fn hello_world() {
    let out = run(
        "function main() { return { message: 'hello world' } }",
        json!(null),
    )
    .await
    .unwrap();
    assert_eq!(out.code_return, json!({"message": "hello world"}));
}

#[tokio::test]
async fn circle_area_from_radius() {
    let code = r#"
        function main({radius}) {
            const area = Math.PI * radius * radius;
            const circumference = 2 * Math.PI * radius;
            return {
                area: Math.round(area * 100) / 100,
                circumference: Math.round(circumference * 100) / 100,
            };
        }
    "#;
    let out = run(code, json!({"radius": 5})).await.unwrap();
    assert_eq!(out.code_return["area"], json!(78.54));
    assert_eq!(out.code_return["circumference"], json!(31.42));
}

#[tokio::test]
async fn repeated_executions_are_independent() {
    let code = r#"
        if (typeof globalThis.counter === 'undefined') { globalThis.counter = 0; }
        globalThis.counter += 1;
        function main() { return { counter: globalThis.counter } }
    "#;
    for _ in 0..3 {
        let out = run(code, json!(null)).await.unwrap();
        // A fresh context per call: state never carries over.
        assert_eq!(out.code_return, json!({"counter": 1}));
    }
}

#[tokio::test]
async fn values_round_trip_unchanged() {
    let code = "function main(vars) { return { echoed: vars } }";
    let vars = json!({
        "string": "héllo wörld \u{1F980}",
        "int": 42,
        "float": 3.5,
        "bool": true,
        "nothing": null,
        "list": [1, "two", [3]],
        "nested": {"a": {"b": "c"}},
    });
    let out = run(code, vars.clone()).await.unwrap();
    assert_eq!(out.code_return["echoed"], vars);
}

#[tokio::test]
async fn console_output_lands_in_log_channel() {
    let code = r#"
        function main() {
            console.log('first');
            console.error('second', 123);
            return { done: true };
        }
    "#;
    let out = run(code, json!(null)).await.unwrap();
    assert_eq!(out.code_return, json!({"done": true}));
    assert_eq!(out.log, "first\nsecond 123");
}

#[tokio::test]
async fn log_never_leaks_into_return_value() {
    let out = run(
        "function main() { console.log('noise'); return { value: 1 } }",
        json!(null),
    )
    .await
    .unwrap();
    assert_eq!(out.code_return, json!({"value": 1}));
}

#[tokio::test]
async fn null_variable_falls_back_to_default() {
    let code = r#"
        function main({value}) {
            const isNone = value === null || value === undefined;
            return { isNone, effective: isNone ? 'default' : value };
        }
    "#;
    let out = run(code, json!({"value": null})).await.unwrap();
    assert_eq!(out.code_return, json!({"isNone": true, "effective": "default"}));

    // Absent key behaves the same as an explicit null.
    let out = run(code, json!({})).await.unwrap();
    assert_eq!(out.code_return, json!({"isNone": true, "effective": "default"}));

    let out = run(code, json!({"value": 7})).await.unwrap();
    assert_eq!(out.code_return, json!({"isNone": false, "effective": 7}));
}

#[tokio::test]
async fn count_token_is_available() {
    let out = run(
        "function main({text}, sandbox) { return { tokens: sandbox.countToken(text) } }",
        json!({"text": "abcdefgh"}),
    )
    .await
    .unwrap();
    assert_eq!(out.code_return, json!({"tokens": 2}));
}

#[tokio::test]
async fn str_to_base64_is_available() {
    let out = run(
        "function main(vars, sandbox) { return { b64: sandbox.strToBase64('hi', 'data:,') } }",
        json!(null),
    )
    .await
    .unwrap();
    assert_eq!(out.code_return, json!({"b64": "data:,aGk="}));
}

#[tokio::test]
async fn create_hmac_returns_timestamp_and_sign() {
    let code = r#"
        function main(vars, sandbox) {
            const { timestamp, sign } = sandbox.createHmac('sha256', 'secret');
            return { hasTimestamp: typeof timestamp === 'string' && timestamp.length > 0,
                     hasSign: typeof sign === 'string' && sign.length > 0 };
        }
    "#;
    let out = run(code, json!(null)).await.unwrap();
    assert_eq!(out.code_return, json!({"hasTimestamp": true, "hasSign": true}));
}

#[tokio::test]
async fn async_entry_with_delay_resolves() {
    let code = r#"
        async function main(vars, sandbox) {
            await sandbox.delay(50);
            return { waited: true };
        }
    "#;
    let out = run(code, json!(null)).await.unwrap();
    assert_eq!(out.code_return, json!({"waited": true}));
}

#[tokio::test]
async fn oversized_delay_is_rejected() {
    let code = r#"
        async function main(vars, sandbox) {
            await sandbox.delay(60000);
            return { waited: true };
        }
    "#;
    let err = run(code, json!(null)).await.unwrap_err();
    assert!(matches!(err, SandboxError::Runtime(_)), "got {err:?}");
    assert!(err.to_string().contains("Delay must be <="), "got {err}");
}

#[tokio::test]
async fn missing_entry_function_reported() {
    let err = run("const x = 1;", json!(null)).await.unwrap_err();
    assert!(err.to_string().contains("No 'main' function defined"), "got {err}");
}

#[tokio::test]
async fn snippet_exception_is_runtime_error() {
    let err = run(
        "function main() { throw new Error('boom') }",
        json!(null),
    )
    .await
    .unwrap_err();
    match err {
        SandboxError::Runtime(msg) => assert!(msg.contains("boom"), "got {msg}"),
        other => panic!("expected runtime error, got {other:?}"),
    }
}

#[tokio::test]
async fn scalar_return_is_invalid_response() {
    let err = run("function main() { return 42 }", json!(null)).await.unwrap_err();
    assert!(matches!(err, SandboxError::InvalidResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn array_return_is_invalid_response() {
    let err = run("function main() { return [1, 2] }", json!(null)).await.unwrap_err();
    assert!(matches!(err, SandboxError::InvalidResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn empty_code_rejected_without_building_a_context() {
    let err = run("   \n  ", json!(null)).await.unwrap_err();
    assert!(matches!(err, SandboxError::InvalidInput(_)), "got {err:?}");
}

#[tokio::test]
async fn infinite_loop_hits_wall_clock_budget() {
    let code = "function main() { while (true) {} }";
    let started = Instant::now();
    let err = executor()
        .execute(code, &Variables::new(), Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::TimeoutOrKilled(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn runaway_allocation_hits_memory_ceiling() {
    let executor = JsExecutor::new(
        Arc::new(SecurityPolicy::builtin()),
        ContextLimits {
            memory_bytes: 8 * 1024 * 1024,
            max_delay: Duration::from_secs(10),
        },
    );
    let code = r#"
        function main() {
            const chunks = [];
            while (true) { chunks.push('x'.repeat(1024 * 1024)); }
        }
    "#;
    let err = executor
        .execute(code, &Variables::new(), TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::TimeoutOrKilled(_)), "got {err:?}");
}

#[tokio::test]
async fn no_host_escape_hatches_exist() {
    // None of these names exist inside the context; referencing them throws.
    for name in ["require", "process", "fetch", "XMLHttpRequest"] {
        let code = format!("function main() {{ return {{ t: typeof {name} }} }}");
        let out = run(&code, json!(null)).await.unwrap();
        assert_eq!(out.code_return, json!({"t": "undefined"}), "{name} should not exist");
    }
}
