use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::executor::types::{ExecutionRequest, ExecutorOutput};

/// Produces the content of one task from its resolved dependency outputs.
///
/// The engine treats the executor as opaque: it wraps every call in a timeout
/// and the retry strategy, and downgrades any error to a Failed output.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executor name, recorded in each output's metadata.
    fn name(&self) -> &str;

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorOutput, ExecutionError>;
}
