use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{EngineError, InputParseError};
use crate::executor::ExecutionEngine;

use super::source::InputSource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchSummary {
    pub applied: usize,
    pub rejected: usize,
    /// Document versions written while watching.
    pub versions: Vec<String>,
}

/// Feeds human input from a source into the engine, one event at a time.
pub struct InputWatcher {
    engine: Arc<ExecutionEngine>,
}

impl InputWatcher {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self { engine }
    }

    /// Consume events until the source ends or `shutdown` turns true.
    ///
    /// An event already handed to the engine is always finished before
    /// shutdown is honoured; both documents are flushed on the way out.
    /// Persistence failures end the loop with an error.
    pub async fn run<S>(
        &self,
        source: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<WatchSummary, EngineError>
    where
        S: InputSource + ?Sized,
    {
        let mut summary = WatchSummary::default();
        tracing::info!(source = source.name(), "input watcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let event = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                event = source.next_event() => event,
            };

            let Some(event) = event else {
                tracing::debug!(source = source.name(), "input source exhausted");
                break;
            };

            match self.engine.apply_input(event.clone()).await {
                Ok(run) => {
                    summary.applied += 1;
                    if let Some(version) = run.version {
                        summary.versions.push(version);
                    }
                    source.acknowledge(&event).await;
                }
                Err(EngineError::UnknownTask(task_id)) => {
                    let err = InputParseError::UnknownTask(task_id);
                    summary.rejected += 1;
                    source.reject(&event, &err.to_string()).await;
                }
                Err(err) => return Err(err),
            }
        }

        self.engine.flush().await?;
        tracing::info!(
            applied = summary.applied,
            rejected = summary.rejected,
            "input watcher stopped"
        );
        Ok(summary)
    }
}
