mod config;
mod error;
mod gateway;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use sandbox::{ExecutionRequest, Language};
use tokio::io::AsyncReadExt;
use tracing_subscriber::fmt::time::FormatTime;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::SandboxGateway;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

/// Run an untrusted code snippet inside the sandbox and print its result as
/// JSON on stdout.
#[derive(Parser)]
#[command(name = "gateway", version)]
struct Cli {
    /// Path to the snippet, or `-` to read it from stdin
    code: PathBuf,

    /// Snippet language: javascript or python
    #[arg(short, long)]
    language: String,

    /// Variables for the entry function, as a JSON object
    #[arg(short, long, default_value = "null")]
    variables: String,

    /// Override the configured wall-clock budget
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Gateway config file (YAML); defaults apply when omitted
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

fn parse_language(name: &str) -> GatewayResult<Language> {
    match name {
        "javascript" | "js" => Ok(Language::Javascript),
        "python" | "py" => Ok(Language::Python),
        other => Err(GatewayError::Config(format!(
            "unknown language: {other} (expected javascript or python)"
        ))),
    }
}

async fn read_code(path: &PathBuf) -> GatewayResult<String> {
    if path.as_os_str() == "-" {
        let mut code = String::new();
        tokio::io::stdin()
            .read_to_string(&mut code)
            .await
            .map_err(|e| GatewayError::Config(format!("read stdin: {e}")))?;
        Ok(code)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("read {}: {e}", path.display())))
    }
}

async fn run(cli: Cli) -> GatewayResult<()> {
    let mut config = match &cli.config {
        Some(path) => config::load(path).await?,
        None => config::GatewayConfig::default(),
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    let request = ExecutionRequest {
        code: read_code(&cli.code).await?,
        variables: serde_json::from_str(&cli.variables)
            .map_err(|e| GatewayError::Config(format!("parse variables: {e}")))?,
        language: parse_language(&cli.language)?,
    };

    let gateway = SandboxGateway::new(&config)?;
    let output = gateway.execute(&request).await?;

    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|e| GatewayError::Config(format!("serialize output: {e}")))?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_aliases_parse() {
        assert_eq!(parse_language("javascript").unwrap(), Language::Javascript);
        assert_eq!(parse_language("js").unwrap(), Language::Javascript);
        assert_eq!(parse_language("python").unwrap(), Language::Python);
        assert_eq!(parse_language("py").unwrap(), Language::Python);
        assert!(parse_language("ruby").is_err());
    }
}
