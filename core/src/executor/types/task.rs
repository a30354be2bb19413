use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Common task interface for executor graph handling.
pub trait TaskLike: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];

    /// Tasks to regenerate once this task's real data arrives.
    fn affected_outputs(&self) -> &[String] {
        &[]
    }
}

/// How a skippable, human-gated task is substituted while its input is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SkipStrategy {
    #[default]
    Placeholder,
    Inference,
    Omit,
}

impl SkipStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::Inference => "inference",
            Self::Omit => "omit",
        }
    }
}

/// Static description of one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, alias = "dependsOn", alias = "depends_on")]
    pub dependencies: Vec<String>,

    #[serde(default, alias = "humanRequired")]
    pub human_required: bool,

    #[serde(default, alias = "canSkip")]
    pub can_skip: bool,

    #[serde(default, alias = "skipStrategy")]
    pub skip_strategy: SkipStrategy,

    #[serde(default, alias = "affectedOutputs")]
    pub affected_outputs: Vec<String>,

    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

impl TaskDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            dependencies: Vec::new(),
            human_required: false,
            can_skip: false,
            skip_strategy: SkipStrategy::default(),
            affected_outputs: Vec::new(),
            category: default_category(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the task as gated on human input.
    pub fn human(mut self, can_skip: bool, strategy: SkipStrategy) -> Self {
        self.human_required = true;
        self.can_skip = can_skip;
        self.skip_strategy = strategy;
        self
    }

    pub fn affects<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_outputs = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl TaskLike for TaskDefinition {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn affected_outputs(&self) -> &[String] {
        &self.affected_outputs
    }
}

/// The static task table, in definition order.
///
/// Loaded once at startup and handed to the engine; nothing in the crate keeps
/// it in a global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTable {
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

impl TaskTable {
    pub fn new(tasks: Vec<TaskDefinition>) -> Self {
        Self { tasks }
    }

    /// Load a table from a `.toml` (`[[tasks]]`) or `.json` file.
    ///
    /// JSON may be either `{"tasks": [...]}` or a bare array.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task table {:?}", path))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw)
                .with_context(|| format!("Failed to parse task table {:?}", path)),
            _ => toml::from_str::<TaskTable>(&raw)
                .with_context(|| format!("Failed to parse task table {:?}", path)),
        }
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if value.is_array() {
            let tasks: Vec<TaskDefinition> = serde_json::from_value(value)?;
            return Ok(Self { tasks });
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn get(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.iter()
    }
}
