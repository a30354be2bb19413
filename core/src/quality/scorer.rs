use crate::config::{QualityConfig, Weighting};
use crate::executor::types::{TaskDefinition, TaskTable};
use crate::state::WorkflowState;

/// Weight of one task under the configured scheme. Never negative.
pub fn task_weight(task: &TaskDefinition, cfg: &QualityConfig) -> f64 {
    match cfg.weighting {
        Weighting::Uniform => 1.0,
        Weighting::Category => cfg
            .category_weights
            .get(&task.category)
            .copied()
            .unwrap_or(1.0)
            .max(0.0),
    }
}

/// Weighted mean of every task's current quality, as a percentage.
///
/// Tasks without an output, and Paused or Failed ones, contribute 0.
pub fn quality_score(state: &WorkflowState, table: &TaskTable, cfg: &QualityConfig) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;

    for task in table.iter() {
        let weight = task_weight(task, cfg);
        total += weight;
        weighted += weight
            * state
                .output(&task.id)
                .map(|o| o.effective_quality())
                .unwrap_or(0.0);
    }

    if total <= 0.0 {
        return 0.0;
    }
    weighted / total * 100.0
}
