mod contract;
mod error;
mod executor;
mod policy;
mod scratch;
mod types;

pub use contract::{ensure_object, validate_code, validate_variables};
pub use error::{Result, SandboxError};
pub use executor::Executor;
pub use policy::{HostCapability, SecurityPolicy};
pub use scratch::ScratchWorkspace;
pub use types::{ExecutionOutput, ExecutionRequest, Language, Variables};
