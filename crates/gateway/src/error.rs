use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Sandbox(#[from] sandbox::SandboxError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
