//! CLI assembly: apply flag overrides to the config, build the engine and run
//! one command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reflow_core::api as core_api;
use reflow_core::api::{CliError, EngineError, GraphError};
use reflow_plugins::factory;
use serde_json::json;

use crate::commands::cli::{Args, ClearArgs, Commands, InputArgs, RunArgs, WatchArgs};
use crate::shutdown::shutdown_channel;

/// Fold global flags into the loaded config.
pub fn apply_overrides(cfg: &mut core_api::AppConfig, args: &Args) {
    if let Some(tasks) = &args.tasks {
        cfg.tasks_file = tasks.clone();
    }
    if let Some(dir) = &args.state_dir {
        cfg.storage.state_file = dir.join("workflow_state.json").to_string_lossy().to_string();
        cfg.storage.versions_file = dir
            .join("version_history.json")
            .to_string_lossy()
            .to_string();
    }
}

#[tracing::instrument(name = "cli.dispatch", skip_all)]
pub async fn dispatch(args: Args, mut cfg: core_api::AppConfig) -> Result<i32, CliError> {
    apply_overrides(&mut cfg, &args);
    let json = args.json;

    match args.command {
        Commands::Validate => validate(&cfg, json),
        Commands::Plan => plan(&cfg, json),
        Commands::Run(run_args) => run(cfg, run_args, json).await,
        Commands::Status => status(&cfg, json).await,
        Commands::Input(input_args) => input(&cfg, input_args, json).await,
        Commands::Watch(watch_args) => watch(cfg, watch_args, json).await,
        Commands::Versions => versions(&cfg, json).await,
        Commands::Report => report(&cfg, json).await,
        Commands::Clear(clear_args) => clear(&cfg, clear_args, json).await,
    }
}

fn load_table(cfg: &core_api::AppConfig) -> Result<core_api::TaskTable, CliError> {
    factory::load_tasks(cfg).map_err(|e| CliError::Config(format!("{e:#}")))
}

fn build_engine(cfg: &core_api::AppConfig) -> Result<core_api::ExecutionEngine, CliError> {
    let table = load_table(cfg)?;
    Ok(factory::build_engine(cfg, table)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("encode output: {e}")))?;
    println!("{s}");
    Ok(())
}

fn validate(cfg: &core_api::AppConfig, json: bool) -> Result<i32, CliError> {
    let table = load_table(cfg)?;
    let problems = core_api::TaskGraph::validate_dependencies(&table.tasks);

    if json {
        print_json(&json!({
            "tasks_file": cfg.tasks_file,
            "tasks": table.len(),
            "valid": problems.is_empty(),
            "problems": problems,
        }))?;
    } else if problems.is_empty() {
        println!("{}: {} tasks, no problems found", cfg.tasks_file, table.len());
    } else {
        println!("{}: {} problem(s)", cfg.tasks_file, problems.len());
        for p in &problems {
            println!("  - {p}");
        }
    }

    if problems.is_empty() {
        Ok(0)
    } else {
        Err(EngineError::Graph(GraphError::Invalid(problems)).into())
    }
}

fn plan(cfg: &core_api::AppConfig, json: bool) -> Result<i32, CliError> {
    let table = load_table(cfg)?;
    let problems = core_api::TaskGraph::validate_dependencies(&table.tasks);
    if !problems.is_empty() {
        return Err(EngineError::Graph(GraphError::Invalid(problems)).into());
    }

    let graph = core_api::TaskGraph::build(&table.tasks).map_err(EngineError::from)?;
    let batches = graph.topological_sort().map_err(EngineError::from)?;
    let stats = graph.statistics().map_err(EngineError::from)?;

    if json {
        print_json(&json!({ "batches": batches, "statistics": stats }))?;
        return Ok(0);
    }

    for (i, batch) in batches.iter().enumerate() {
        println!("batch {}: {}", i + 1, batch.join(", "));
    }
    println!();
    println!("tasks:               {}", stats.total_tasks);
    println!("batches:             {}", stats.batch_count);
    println!("max parallelism:     {}", stats.max_parallelism);
    println!("critical path:       {}", stats.critical_path_length);
    println!("mean dependencies:   {:.2}", stats.mean_dependencies);
    Ok(0)
}

fn print_summary(summary: &core_api::RunSummary) {
    if summary.is_noop() && !summary.interrupted {
        println!("nothing to do (quality {:.1}%)", summary.quality);
        return;
    }

    println!(
        "{} task(s) updated in {} iteration(s), {} execution(s), {}ms",
        summary.updated.len(),
        summary.iterations,
        summary.executions,
        summary.duration_ms
    );
    for (label, ids) in [
        ("completed", &summary.completed),
        ("skipped", &summary.skipped),
        ("paused", &summary.paused),
        ("failed", &summary.failed),
    ] {
        if !ids.is_empty() {
            println!("  {label:<10} {}", ids.join(", "));
        }
    }
    match &summary.version {
        Some(v) => println!("version {v}, quality {:.1}%", summary.quality),
        None => println!("quality {:.1}%", summary.quality),
    }
    if summary.interrupted {
        println!("interrupted: remaining tasks run on the next `reflow run`");
    }
}

async fn run(mut cfg: core_api::AppConfig, args: RunArgs, json: bool) -> Result<i32, CliError> {
    if args.progress && !json {
        cfg.engine.progress_bar = true;
    }
    if let Some(n) = args.max_concurrency {
        cfg.engine.max_concurrency = n.max(1);
    }

    let shutdown = shutdown_channel();
    let engine = build_engine(&cfg)?;
    let summary = engine.run_with_shutdown(shutdown).await?;

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }
    Ok(0)
}

async fn status(cfg: &core_api::AppConfig, json: bool) -> Result<i32, CliError> {
    let engine = build_engine(cfg)?;
    let report = engine.status_report().await;

    if json {
        print_json(&report)?;
        return Ok(0);
    }

    println!(
        "workflow {}  quality {:.1}%  version {}",
        report.workflow_id,
        report.quality,
        report.current_version.as_deref().unwrap_or("-")
    );
    for line in &report.tasks {
        let version = line
            .version
            .map(|v| format!("v{v}"))
            .unwrap_or_else(|| "-".to_string());
        let marker = if line.is_placeholder { " (placeholder)" } else { "" };
        print!(
            "  {:<24} {:<12} {:<4} {:>5.2}{marker}",
            line.task_id,
            line.status.as_str(),
            version,
            line.quality
        );
        if line.waiting_on.is_empty() {
            println!();
        } else {
            println!("  waiting on {}", line.waiting_on.join(", "));
        }
    }

    if !report.blocked.is_empty() {
        println!();
        println!("blocked:");
        for b in &report.blocked {
            println!(
                "  {} [{}] blocks {} task(s): {}",
                b.task_id, b.status, b.blocked_dependents, b.reason
            );
            println!("    -> {}", b.remediation);
        }
    }
    Ok(0)
}

async fn input(cfg: &core_api::AppConfig, args: InputArgs, json: bool) -> Result<i32, CliError> {
    let engine = build_engine(cfg)?;
    let event = core_api::parse_input_file(&args.file, Some(&args.task)).await?;
    let summary = engine.apply_input(event).await?;

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }
    Ok(0)
}

async fn watch(mut cfg: core_api::AppConfig, args: WatchArgs, json: bool) -> Result<i32, CliError> {
    if let Some(dir) = &args.dir {
        cfg.input.directory = dir.to_string_lossy().to_string();
    }
    let interval_ms = args.interval_ms.unwrap_or(cfg.input.poll_interval_ms).max(10);

    let shutdown = shutdown_channel();
    let engine = Arc::new(build_engine(&cfg)?);
    let initial = engine.run_with_shutdown(shutdown.clone()).await?;
    if !json {
        print_summary(&initial);
        if !initial.interrupted {
            println!(
                "watching {} (every {}ms, Ctrl+C to stop)",
                cfg.input.directory, interval_ms
            );
        }
    }

    let mut source = core_api::DirectoryInputSource::new(
        PathBuf::from(&cfg.input.directory),
        Duration::from_millis(interval_ms),
    );
    let watcher = core_api::InputWatcher::new(engine.clone());
    let summary = watcher.run(&mut source, shutdown).await?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "applied {} input(s), rejected {}, versions: {}",
            summary.applied,
            summary.rejected,
            if summary.versions.is_empty() {
                "-".to_string()
            } else {
                summary.versions.join(", ")
            }
        );
    }
    Ok(0)
}

async fn versions(cfg: &core_api::AppConfig, json: bool) -> Result<i32, CliError> {
    let engine = build_engine(cfg)?;
    let versions = engine.list_versions().await;

    if json {
        print_json(&versions)?;
        return Ok(0);
    }

    if versions.is_empty() {
        println!("no versions yet");
    }
    for v in &versions {
        println!(
            "{:<5} {}  quality {:>5.1}% ({:+.1})  {:<20} {}",
            v.label,
            v.generated_at.format("%Y-%m-%d %H:%M:%S"),
            v.quality,
            v.quality_delta,
            v.trigger.to_string(),
            v.updated_sections.join(", ")
        );
    }
    Ok(0)
}

async fn report(cfg: &core_api::AppConfig, json: bool) -> Result<i32, CliError> {
    let engine = build_engine(cfg)?;
    let report = engine.quality_report().await;

    if json {
        print_json(&report)?;
        return Ok(0);
    }

    println!("overall quality {:.1}%", report.overall);
    println!(
        "real data {} / placeholder {} / paused {} / failed {}",
        report.metrics.real_data_sections,
        report.metrics.placeholder_sections,
        report.metrics.paused,
        report.metrics.failed
    );
    println!();
    for s in &report.sections {
        println!(
            "  {:<24} {:<12} {:>5.2} (weight {:.2})",
            s.task_id,
            format!("{:?}", s.class).to_lowercase(),
            s.quality,
            s.weight
        );
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("recommendations:");
        for r in &report.recommendations {
            println!(
                "  [{:?}] +{:.1} pts  {}",
                r.priority, r.expected_gain, r.action
            );
        }
    }
    Ok(0)
}

async fn clear(cfg: &core_api::AppConfig, args: ClearArgs, json: bool) -> Result<i32, CliError> {
    let engine = build_engine(cfg)?;
    let summary = engine.clear_failed(&args.task).await?;

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }
    Ok(0)
}
