use serde::{Deserialize, Serialize};

/// Variable map handed to the snippet's entry function. Keys are validated
/// non-empty; values are arbitrary JSON.
pub type Variables = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Javascript => f.write_str("javascript"),
            Self::Python => f.write_str("python"),
        }
    }
}

/// One snippet execution as produced by the workflow dispatch layer.
///
/// `variables` is kept as raw JSON here: the upstream contract allows `null`
/// (normalized to `{}`) and rejects everything that is not an object, which
/// [`crate::validate_variables`] enforces before any executor runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    #[serde(default)]
    pub variables: serde_json::Value,
    pub language: Language,
}

/// Successful execution: the entry function's return value plus everything
/// the snippet logged. The two channels never mix — log output cannot leak
/// into `code_return` and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    /// Always a JSON object, never a scalar (enforced by [`crate::ensure_object`]).
    pub code_return: serde_json::Value,
    pub log: String,
}
