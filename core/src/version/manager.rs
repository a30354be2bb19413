use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a new document version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum VersionTrigger {
    /// First convergence of the workflow.
    Initial,
    /// Real human input arrived for a task.
    Input(String),
    /// A later `run()` changed outputs (e.g. a failed task was retried).
    Rerun,
}

impl std::fmt::Display for VersionTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => f.write_str("initial"),
            Self::Input(task_id) => write!(f, "input:{task_id}"),
            Self::Rerun => f.write_str("rerun"),
        }
    }
}

impl From<VersionTrigger> for String {
    fn from(trigger: VersionTrigger) -> Self {
        trigger.to_string()
    }
}

impl TryFrom<String> for VersionTrigger {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.as_str() {
            "initial" => Ok(Self::Initial),
            "rerun" => Ok(Self::Rerun),
            other => match other.strip_prefix("input:") {
                Some(task_id) if !task_id.is_empty() => Ok(Self::Input(task_id.to_string())),
                _ => Err(format!("unknown version trigger '{other}'")),
            },
        }
    }
}

/// One immutable snapshot entry of the whole report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub number: u64,
    pub label: String,
    pub generated_at: DateTime<Utc>,
    /// Aggregate quality, 0-100.
    pub quality: f64,
    pub trigger: VersionTrigger,
    pub updated_sections: Vec<String>,
    /// Label of the version this one supersedes.
    pub previous: Option<String>,
    #[serde(default)]
    pub quality_delta: f64,
}

/// Input for [`VersionManager::create_version`].
#[derive(Debug, Clone, PartialEq)]
pub struct VersionMeta {
    pub trigger: VersionTrigger,
    pub quality: f64,
    pub updated_sections: Vec<String>,
}

/// The persisted version-history document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionHistory {
    /// Number the next version gets; survives pruning so numbers are never reused.
    #[serde(default = "first_version_number")]
    pub next_number: u64,
    #[serde(default)]
    pub versions: Vec<DocumentVersion>,
}

fn first_version_number() -> u64 {
    1
}

impl Default for VersionHistory {
    fn default() -> Self {
        Self {
            next_number: first_version_number(),
            versions: Vec::new(),
        }
    }
}

/// Version log manager
pub struct VersionManager {
    history: VersionHistory,
    /// Maximum retained versions
    max_versions: usize,
}

impl VersionManager {
    pub fn new(max_versions: usize) -> Self {
        Self::from_history(VersionHistory::default(), max_versions)
    }

    pub fn from_history(history: VersionHistory, max_versions: usize) -> Self {
        let mut manager = Self {
            history,
            max_versions: max_versions.max(1),
        };
        manager.prune();
        manager
    }

    /// Append a version linked to the current one, pruning the oldest entries
    /// past the retention cap.
    pub fn create_version(&mut self, meta: VersionMeta) -> DocumentVersion {
        let number = self.history.next_number;
        let previous = self.history.versions.last();

        let version = DocumentVersion {
            number,
            label: format!("v{number}"),
            generated_at: Utc::now(),
            quality: meta.quality,
            quality_delta: meta.quality - previous.map(|p| p.quality).unwrap_or(0.0),
            previous: previous.map(|p| p.label.clone()),
            trigger: meta.trigger,
            updated_sections: meta.updated_sections,
        };

        self.history.next_number = number + 1;
        self.history.versions.push(version.clone());
        self.prune();

        tracing::info!(
            version = %version.label,
            trigger = %version.trigger,
            quality = version.quality,
            delta = version.quality_delta,
            sections = version.updated_sections.len(),
            "document version created"
        );

        version
    }

    /// Label of the latest version.
    pub fn current_version(&self) -> Option<String> {
        self.current().map(|v| v.label.clone())
    }

    pub fn current(&self) -> Option<&DocumentVersion> {
        self.history.versions.last()
    }

    /// Retained versions, oldest first.
    pub fn list(&self) -> &[DocumentVersion] {
        &self.history.versions
    }

    pub fn history(&self) -> &VersionHistory {
        &self.history
    }

    pub fn is_empty(&self) -> bool {
        self.history.versions.is_empty()
    }

    fn prune(&mut self) {
        let len = self.history.versions.len();
        if len > self.max_versions {
            let excess = len - self.max_versions;
            let removed: Vec<DocumentVersion> = self.history.versions.drain(..excess).collect();
            for version in removed {
                tracing::debug!(version = %version.label, "pruned document version");
            }
        }
    }
}
