use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

pub(crate) const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_MEMORY_LIMIT_MB: u64 = 128;
pub(crate) const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Execution budgets and interpreter discovery, loadable from a YAML file.
/// Every field has a default, so an empty file (or no file at all) yields a
/// working configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Wall-clock budget per execution, both languages.
    pub timeout_ms: u64,
    /// Heap ceiling for the in-process JavaScript context.
    pub memory_limit_mb: u64,
    /// Cap on a single `delay()` call inside a snippet.
    pub max_delay_ms: u64,
    /// Interpreter override; `python3` is resolved from `PATH` when unset.
    pub python_bin: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            python_bin: None,
        }
    }
}

/// Load a gateway config from a YAML file.
pub async fn load(path: &Path) -> GatewayResult<GatewayConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GatewayError::Config(format!("read {}: {e}", path.display())))?;
    let config: GatewayConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| GatewayError::Config(format!("parse {}: {e}", path.display())))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &GatewayConfig) -> GatewayResult<()> {
    if config.timeout_ms == 0 {
        return Err(GatewayError::Config("timeout_ms must be positive".into()));
    }
    if config.memory_limit_mb == 0 {
        return Err(GatewayError::Config(
            "memory_limit_mb must be positive".into(),
        ));
    }
    Ok(())
}
