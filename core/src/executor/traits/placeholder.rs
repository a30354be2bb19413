use std::collections::BTreeMap;

use crate::executor::types::{ResolvedDependency, SkipStrategy, TaskDefinition};

/// Quality assigned to every substitute output.
pub const PLACEHOLDER_QUALITY: f64 = 0.5;

/// Builds substitute content for a skippable task whose human input is missing.
///
/// Generation is synchronous and must not fail; the output is stored as a
/// Skipped, placeholder section.
pub trait PlaceholderGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        task: &TaskDefinition,
        strategy: SkipStrategy,
        dependencies: &BTreeMap<String, ResolvedDependency>,
    ) -> serde_json::Value;
}
