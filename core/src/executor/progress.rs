use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::state::TaskStatus;

/// Visual progress monitor for the scheduling loop
///
/// One overall bar counting decided tasks plus a spinner per task in the
/// current batch.
pub struct ProgressMonitor {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: HashMap<String, ProgressBar>,
    enabled: bool,
}

impl ProgressMonitor {
    /// Create a new progress monitor
    ///
    /// # Arguments
    ///
    /// * `total_tasks` - Tasks still undecided when the loop starts
    /// * `enabled` - Whether to draw anything at all
    pub fn new(total_tasks: usize, enabled: bool) -> Self {
        if !enabled {
            return Self {
                multi: MultiProgress::new(),
                overall: ProgressBar::hidden(),
                task_bars: HashMap::new(),
                enabled: false,
            };
        }

        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(total_tasks as u64));

        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        overall.set_style(style);
        overall.set_message("Starting...");

        Self {
            multi,
            overall,
            task_bars: HashMap::new(),
            enabled: true,
        }
    }

    pub fn add_task(&mut self, task_id: &str) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        bar.set_style(style);
        bar.set_message(format!("⏳ {}", task_id));
        bar.enable_steady_tick(Duration::from_millis(100));

        self.task_bars.insert(task_id.to_string(), bar);
    }

    /// Mark a task as decided with its final status.
    pub fn complete_task(&mut self, task_id: &str, status: TaskStatus, duration_ms: u64) {
        if !self.enabled {
            return;
        }

        let icon = match status {
            TaskStatus::Completed => "✅",
            TaskStatus::Skipped => "⏭",
            TaskStatus::Paused => "⏸",
            TaskStatus::Failed => "❌",
            TaskStatus::NotStarted => "·",
        };

        match self.task_bars.remove(task_id) {
            Some(bar) => bar.finish_with_message(format!(
                "{} {} {} ({}ms)",
                icon, task_id, status, duration_ms
            )),
            None => self
                .overall
                .println(format!("{} {} {}", icon, task_id, status)),
        }

        self.overall.inc(1);
    }

    pub fn update_iteration(&self, iteration: usize, batch_size: usize) {
        if self.enabled {
            self.overall
                .set_message(format!("Iteration {} ({} ready)", iteration, batch_size));
        }
    }

    pub fn finish(&self, blocked: usize) {
        if !self.enabled {
            return;
        }

        let msg = if blocked == 0 {
            "✅ Workflow converged".to_string()
        } else {
            format!("⏸ Converged with {} blocked task(s)", blocked)
        };

        self.overall.finish_with_message(msg);
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for (_, bar) in self.task_bars.drain() {
            bar.finish_and_clear();
        }
    }
}
