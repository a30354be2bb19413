use std::collections::BTreeMap;

use serde_json::{json, Value};

use reflow_core::executor::traits::PlaceholderGenerator;
use reflow_core::executor::types::{ResolvedDependency, SkipStrategy, TaskDefinition};

/// Builds substitute sections for skippable tasks that lack human input.
///
/// Every generated document carries `"placeholder": true` and the strategy
/// used, so downstream executors and readers can tell it apart from real
/// data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlaceholderGenerator;

impl PlaceholderGenerator for DefaultPlaceholderGenerator {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn generate(
        &self,
        task: &TaskDefinition,
        strategy: SkipStrategy,
        dependencies: &BTreeMap<String, ResolvedDependency>,
    ) -> Value {
        match strategy {
            SkipStrategy::Placeholder => json!({
                "placeholder": true,
                "strategy": strategy.as_str(),
                "task": task.id,
                "text": format!("[{}: awaiting input]", task.display_name()),
            }),
            SkipStrategy::Inference => {
                let basis: Vec<Value> = dependencies
                    .values()
                    .map(|dep| {
                        json!({
                            "task": dep.task_id,
                            "version": dep.version,
                            "placeholder": dep.is_placeholder,
                        })
                    })
                    .collect();
                let text = if dependencies.is_empty() {
                    format!("{} inferred without upstream data", task.display_name())
                } else {
                    let ids: Vec<&str> = dependencies.keys().map(String::as_str).collect();
                    format!("{} inferred from {}", task.display_name(), ids.join(", "))
                };

                json!({
                    "placeholder": true,
                    "strategy": strategy.as_str(),
                    "task": task.id,
                    "text": text,
                    "basis": basis,
                })
            }
            SkipStrategy::Omit => json!({
                "placeholder": true,
                "strategy": strategy.as_str(),
                "task": task.id,
                "omitted": true,
            }),
        }
    }
}
