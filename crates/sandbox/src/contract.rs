//! Shared request/response contract checks, applied before dispatch and on
//! the way back out of either executor.

use serde_json::Value;

use crate::error::{Result, SandboxError};
use crate::types::Variables;

/// Reject empty or whitespace-only code before any context/process exists.
pub fn validate_code(code: &str) -> Result<()> {
    if code.trim().is_empty() {
        return Err(SandboxError::InvalidInput("Code cannot be empty".into()));
    }
    Ok(())
}

/// Normalize the caller's `variables` into a map.
///
/// `null` is accepted and treated as `{}` (the upstream layer omits the
/// field for snippets without inputs); arrays, strings, numbers and
/// booleans fail fast with a distinguishing message.
pub fn validate_variables(variables: &Value) -> Result<Variables> {
    let map = match variables {
        Value::Null => Variables::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(SandboxError::InvalidInput(format!(
                "Variables must be an object, got {}",
                json_type_name(other)
            )));
        }
    };

    if map.keys().any(|k| k.trim().is_empty()) {
        return Err(SandboxError::InvalidInput(
            "Variable keys must be non-empty strings".into(),
        ));
    }
    Ok(map)
}

/// Enforce the result contract: the entry function's return value must be a
/// JSON object, never a scalar or array.
pub fn ensure_object(value: Value) -> Result<Value> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(SandboxError::InvalidResponse(format!(
            "entry function must return an object, got {}",
            json_type_name(&value)
        )))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
