use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecutionOutput, Language, Variables};

/// One isolation mechanism. Two implementations exist — an in-process
/// memory-capped context and a fresh OS process behind a syscall filter —
/// and the gateway picks one by the request's language tag.
///
/// `execute` suspends the caller until the run settles; the only mid-flight
/// cancellation is the timeout, which force-terminates the underlying
/// context or process.
#[async_trait]
pub trait Executor: Send + Sync {
    fn language(&self) -> Language;

    async fn execute(
        &self,
        code: &str,
        variables: &Variables,
        timeout: Duration,
    ) -> Result<ExecutionOutput>;
}
