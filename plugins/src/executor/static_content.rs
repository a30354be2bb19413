use async_trait::async_trait;
use serde_json::{json, Map, Value};

use reflow_core::error::ExecutionError;
use reflow_core::executor::traits::TaskExecutor;
use reflow_core::executor::types::{ExecutionRequest, ExecutorOutput};

/// Quality lost when every dependency is a placeholder.
const PLACEHOLDER_PENALTY: f64 = 0.2;

/// Deterministic executor that assembles a section from its inputs.
///
/// Useful for dry runs and for exercising a task table without a real
/// content backend. Sections built on placeholder dependencies score lower,
/// so replacing a placeholder with real data raises downstream quality.
pub struct StaticTaskExecutor {
    quality: f64,
}

impl StaticTaskExecutor {
    pub fn new(quality: f64) -> Self {
        Self {
            quality: quality.clamp(0.0, 1.0),
        }
    }
}

impl Default for StaticTaskExecutor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl TaskExecutor for StaticTaskExecutor {
    fn name(&self) -> &str {
        "static"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorOutput, ExecutionError> {
        let task = &request.task;

        let mut inputs = Map::new();
        let mut placeholders = 0usize;
        for (id, dep) in &request.dependencies {
            if dep.is_placeholder {
                placeholders += 1;
            }
            inputs.insert(
                id.clone(),
                json!({
                    "version": dep.version,
                    "placeholder": dep.is_placeholder,
                    "content": dep.content,
                }),
            );
        }

        let degraded = if request.dependencies.is_empty() {
            0.0
        } else {
            placeholders as f64 / request.dependencies.len() as f64
        };
        let quality = self.quality * (1.0 - PLACEHOLDER_PENALTY * degraded);

        let mut content = json!({
            "task": task.id,
            "title": task.display_name(),
            "category": task.category,
            "inputs": Value::Object(inputs),
        });
        if let Some(human) = &request.human_input {
            content["human_input"] = human.clone();
        }

        let mut output = ExecutorOutput::new(content).with_quality(quality);
        output.confidence = quality;
        output.sources = request.dependencies.keys().cloned().collect();
        if placeholders > 0 {
            output.note = Some(format!("{placeholders} input(s) are placeholders"));
        }
        Ok(output)
    }
}
