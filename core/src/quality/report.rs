use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scorer::{quality_score, task_weight};
use crate::config::QualityConfig;
use crate::executor::graph::TaskGraph;
use crate::executor::types::{SkipStrategy, TaskTable};
use crate::state::{TaskStatus, WorkflowMetrics, WorkflowState};

/// How a section's current output should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionClass {
    Complete,
    Partial,
    Placeholder,
    Inference,
    Omitted,
    /// No usable output: not started, paused or failed.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionQuality {
    pub task_id: String,
    pub name: String,
    pub category: String,
    pub status: TaskStatus,
    pub class: SectionClass,
    pub quality: f64,
    pub weight: f64,
    pub version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub task_id: String,
    pub priority: Priority,
    /// Percentage points the overall score gains if this section reaches 1.0.
    pub expected_gain: f64,
    pub blocked_dependents: usize,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub overall: f64,
    pub metrics: WorkflowMetrics,
    pub sections: Vec<SectionQuality>,
    pub recommendations: Vec<Recommendation>,
}

impl QualityReport {
    pub fn count(&self, class: SectionClass) -> usize {
        self.sections.iter().filter(|s| s.class == class).count()
    }
}

/// Classify every section and rank what would improve the report most.
///
/// Recommendations are sorted by priority, then expected gain (both
/// descending), then task id.
pub fn generate_quality_report(
    state: &WorkflowState,
    table: &TaskTable,
    cfg: &QualityConfig,
) -> QualityReport {
    let total_weight: f64 = table.iter().map(|t| task_weight(t, cfg)).sum();
    let graph = TaskGraph::from_tasks(&table.tasks).ok();
    let downstream = |id: &str| {
        graph
            .as_ref()
            .map(|g| g.transitive_dependents(id).len())
            .unwrap_or(0)
    };

    let mut sections = Vec::with_capacity(table.len());
    let mut recommendations = Vec::new();

    for task in table.iter() {
        let output = state.output(&task.id);
        let status = state.status_of(&task.id);
        let quality = output.map(|o| o.effective_quality()).unwrap_or(0.0);
        let weight = task_weight(task, cfg);

        let class = match (status, output) {
            (TaskStatus::Completed, _) if quality >= cfg.complete_threshold => {
                SectionClass::Complete
            }
            (TaskStatus::Completed, _) => SectionClass::Partial,
            (TaskStatus::Skipped, Some(o)) => {
                match o.metadata.skip_strategy.unwrap_or(task.skip_strategy) {
                    SkipStrategy::Placeholder => SectionClass::Placeholder,
                    SkipStrategy::Inference => SectionClass::Inference,
                    SkipStrategy::Omit => SectionClass::Omitted,
                }
            }
            _ => SectionClass::Missing,
        };

        sections.push(SectionQuality {
            task_id: task.id.clone(),
            name: task.display_name().to_string(),
            category: task.category.clone(),
            status,
            class,
            quality,
            weight,
            version: output.map(|o| o.version),
        });

        if class == SectionClass::Complete {
            continue;
        }

        let expected_gain = if total_weight > 0.0 {
            weight / total_weight * (1.0 - quality) * 100.0
        } else {
            0.0
        };
        let blocked = downstream(&task.id);

        let (priority, action) = match (status, class) {
            (TaskStatus::Paused, _) => (
                Priority::High,
                format!(
                    "Provide the required human input for '{}' to unblock {} downstream task(s)",
                    task.id, blocked
                ),
            ),
            (TaskStatus::Failed, _) => {
                let reason = output
                    .and_then(|o| o.metadata.error.as_deref())
                    .unwrap_or("unknown error");
                (
                    Priority::High,
                    format!("Fix the executor failure for '{}' ({reason}) and re-run", task.id),
                )
            }
            (TaskStatus::NotStarted, _) => (
                Priority::Low,
                format!("Resolve the upstream blockers of '{}'", task.id),
            ),
            (_, SectionClass::Placeholder | SectionClass::Inference | SectionClass::Omitted) => {
                let priority = if blocked > 0 {
                    Priority::Medium
                } else {
                    Priority::Low
                };
                (
                    priority,
                    format!(
                        "Supply real data for '{}' to replace its {} output",
                        task.id,
                        task.skip_strategy.as_str()
                    ),
                )
            }
            _ => (
                Priority::Low,
                format!(
                    "Improve '{}' (currently {:.0}% quality)",
                    task.id,
                    quality * 100.0
                ),
            ),
        };

        recommendations.push(Recommendation {
            task_id: task.id.clone(),
            priority,
            expected_gain,
            blocked_dependents: blocked,
            action,
        });
    }

    recommendations.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| {
                b.expected_gain
                    .partial_cmp(&a.expected_gain)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.task_id.cmp(&b.task_id))
    });

    let mut metrics = state.metrics.clone();
    if metrics.total != table.len() {
        let mut indexed = state.clone();
        indexed.refresh_index(table);
        metrics = indexed.metrics;
    }

    QualityReport {
        generated_at: Utc::now(),
        overall: quality_score(state, table, cfg),
        metrics,
        sections,
        recommendations,
    }
}
