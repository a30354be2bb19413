use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "reflow", version, about = "Adaptive task orchestration for human-gated pipelines")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.reflow/config.toml, then ./reflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Task table to use instead of `tasks_file` from the config.
    #[arg(long, global = true)]
    pub tasks: Option<String>,

    /// Directory for workflow_state.json and version_history.json.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the task table and list every problem found.
    Validate,
    /// Show execution batches and graph statistics.
    Plan,
    /// Run the workflow to its fixpoint.
    Run(RunArgs),
    /// Show per-task status and how to unblock paused or failed tasks.
    Status,
    /// Submit human input for one task from a file.
    Input(InputArgs),
    /// Poll the input directory and apply files as they arrive.
    Watch(WatchArgs),
    /// List document versions.
    Versions,
    /// Show the quality report with recommendations.
    Report,
    /// Re-open a failed task and run the workflow.
    Clear(ClearArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Show progress bars while tasks execute.
    #[arg(long)]
    pub progress: bool,

    /// Override `engine.max_concurrency`.
    #[arg(long)]
    pub max_concurrency: Option<usize>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct InputArgs {
    /// Task id the input belongs to.
    pub task: String,

    /// `.json`, `.md` or `.txt` file with the input.
    pub file: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WatchArgs {
    /// Override `input.directory`.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Override `input.poll_interval_ms`.
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ClearArgs {
    pub task: String,
}
