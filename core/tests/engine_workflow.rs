mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{engine, engine_with, report_table, FlakyStore, ImmediateRetry, RecordingExecutor};
use pretty_assertions::assert_eq;
use reflow_core::api::{
    EngineConfig, EngineError, ExecutionEngine, ExecutionError, FailedTaskPolicy, FileStateStore,
    InMemoryStateStore, InputEvent, SkipStrategy, TaskDefinition, TaskStatus, TaskTable,
    VersionTrigger,
};
use serde_json::json;
use tokio::sync::watch;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn first_run_skips_pauses_and_blocks() {
    let executor = RecordingExecutor::new();
    let engine = engine(report_table(), executor.clone());

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.iterations, 4);
    assert_eq!(summary.executions, 2);
    assert_eq!(summary.completed, vec!["brief", "draft"]);
    assert_eq!(summary.skipped, vec!["interview"]);
    assert_eq!(summary.paused, vec!["review"]);
    assert_eq!(summary.version.as_deref(), Some("v1"));
    assert!(close(summary.quality, 46.0), "quality {}", summary.quality);
    assert_eq!(executor.calls(), vec!["brief", "draft"]);

    let state = engine.state().await;
    let interview = state.output("interview").unwrap();
    assert_eq!(interview.status, TaskStatus::Skipped);
    assert!(interview.is_placeholder);
    assert!(close(interview.quality, 0.5));
    assert_eq!(interview.metadata.skip_strategy, Some(SkipStrategy::Inference));
    assert_eq!(interview.content["placeholder"], "interview");

    let draft = state.output("draft").unwrap();
    assert_eq!(draft.content["placeholder_inputs"], json!(["interview"]));

    assert_eq!(state.status_of("publish"), TaskStatus::NotStarted);
    assert!(state.pending.contains("publish"));
    assert!(state.paused.contains("review"));
}

#[tokio::test]
async fn status_report_explains_blocked_tasks() {
    let engine = engine(report_table(), RecordingExecutor::new());
    engine.run().await.unwrap();

    let report = engine.status_report().await;
    assert!(!report.is_converged());
    assert_eq!(report.current_version.as_deref(), Some("v1"));

    let publish = report.tasks.iter().find(|t| t.task_id == "publish").unwrap();
    assert_eq!(publish.waiting_on, vec!["review"]);

    assert_eq!(report.blocked.len(), 1);
    let review = &report.blocked[0];
    assert_eq!(review.task_id, "review");
    assert_eq!(review.status, TaskStatus::Paused);
    assert_eq!(review.blocked_dependents, 1);
    assert!(review.remediation.contains("review"));
}

#[tokio::test]
async fn second_run_without_changes_is_a_noop() {
    let executor = RecordingExecutor::new();
    let engine = engine(report_table(), executor.clone());

    let first = engine.run().await.unwrap();
    let state_after_first = engine.state().await;
    let second = engine.run().await.unwrap();

    assert!(second.is_noop());
    assert_eq!(second.version, None);
    assert_eq!(second.executions, 0);
    assert!(close(second.quality, first.quality));
    assert_eq!(engine.list_versions().await.len(), 1);
    assert_eq!(executor.calls().len(), 2);
    assert_eq!(engine.state().await.outputs, state_after_first.outputs);
}

#[tokio::test]
async fn input_regenerates_task_and_affected_outputs_once() {
    let executor = RecordingExecutor::new();
    let engine = engine(report_table(), executor.clone());
    let first = engine.run().await.unwrap();

    let summary = engine
        .apply_input(InputEvent::new("interview", json!({ "text": "notes" })))
        .await
        .unwrap();

    assert_eq!(summary.updated, vec!["interview", "draft"]);
    assert_eq!(summary.version.as_deref(), Some("v2"));
    assert!(summary.quality > first.quality);
    assert!(close(summary.quality, 60.0), "quality {}", summary.quality);
    assert_eq!(executor.calls_for("interview"), 1);
    assert_eq!(executor.calls_for("draft"), 2);

    let state = engine.state().await;
    let interview = state.output("interview").unwrap();
    assert_eq!(interview.status, TaskStatus::Completed);
    assert!(!interview.is_placeholder);
    assert_eq!(interview.version, 2);
    assert_eq!(interview.content["human_input"]["text"], "notes");

    let draft = state.output("draft").unwrap();
    assert_eq!(draft.version, 2);
    assert_eq!(draft.content["placeholder_inputs"], json!([]));
    let history: Vec<u32> = draft.history().map(|o| o.version).collect();
    assert_eq!(history, vec![2, 1]);

    let versions = engine.list_versions().await;
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].trigger, VersionTrigger::Input("interview".into()));
    assert_eq!(versions[1].previous.as_deref(), Some("v1"));
    assert!(versions[1].quality_delta > 0.0);
}

#[tokio::test]
async fn input_for_paused_task_unblocks_dependents() {
    let executor = RecordingExecutor::new();
    let engine = engine(report_table(), executor.clone());
    engine.run().await.unwrap();
    engine
        .apply_input(InputEvent::new("interview", json!({ "text": "notes" })))
        .await
        .unwrap();

    let summary = engine
        .apply_input(InputEvent::new("review", json!({ "approved": true })))
        .await
        .unwrap();

    assert_eq!(summary.updated, vec!["review", "publish"]);
    assert!(close(summary.quality, 100.0));

    let report = engine.status_report().await;
    assert!(report.is_converged());
    assert_eq!(report.metrics.real_data_sections, 5);
    assert_eq!(report.metrics.placeholder_sections, 0);
}

#[tokio::test]
async fn quality_never_drops_as_inputs_arrive() {
    let engine = engine(report_table(), RecordingExecutor::new());
    let mut last = engine.run().await.unwrap().quality;

    for (task, payload) in [
        ("interview", json!({ "text": "notes" })),
        ("review", json!({ "approved": true })),
        ("interview", json!({ "text": "more notes" })),
    ] {
        let summary = engine
            .apply_input(InputEvent::new(task, payload))
            .await
            .unwrap();
        assert!(summary.quality >= last, "{} < {}", summary.quality, last);
        last = summary.quality;
    }
}

#[tokio::test]
async fn input_before_first_run_is_used_when_task_becomes_ready() {
    let executor = RecordingExecutor::new();
    let engine = engine(report_table(), executor.clone());

    let summary = engine
        .apply_input(InputEvent::new("interview", json!({ "text": "early" })))
        .await
        .unwrap();

    let state = engine.state().await;
    let interview = state.output("interview").unwrap();
    assert_eq!(interview.status, TaskStatus::Completed);
    assert_eq!(interview.version, 1);
    assert_eq!(executor.calls_for("draft"), 1);
    assert_eq!(
        engine.list_versions().await[0].trigger,
        VersionTrigger::Input("interview".into())
    );
    assert_eq!(summary.version.as_deref(), Some("v1"));
}

#[tokio::test]
async fn input_for_unknown_task_is_rejected() {
    let engine = engine(report_table(), RecordingExecutor::new());

    let err = engine
        .apply_input(InputEvent::new("appendix", json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnknownTask(id) if id == "appendix"));
    assert!(engine.list_versions().await.is_empty());
}

#[tokio::test]
async fn failed_task_is_retried_on_next_run() {
    let executor = RecordingExecutor::new();
    executor.fail("brief", 1);
    let engine = engine(report_table(), executor.clone());

    let first = engine.run().await.unwrap();
    assert_eq!(first.failed, vec!["brief"]);
    assert_eq!(first.iterations, 1);
    let state = engine.state().await;
    assert!(state.output("brief").unwrap().metadata.error.is_some());
    assert_eq!(state.status_of("interview"), TaskStatus::NotStarted);

    let second = engine.run().await.unwrap();
    assert_eq!(second.completed, vec!["brief", "draft"]);
    assert_eq!(second.version.as_deref(), Some("v2"));

    let brief = engine.state().await.output("brief").cloned().unwrap();
    assert_eq!(brief.status, TaskStatus::Completed);
    assert_eq!(brief.version, 2);
    assert_eq!(
        brief.previous_version.as_ref().map(|p| p.status),
        Some(TaskStatus::Failed)
    );
}

#[tokio::test]
async fn block_policy_holds_failed_task_until_cleared() {
    let executor = RecordingExecutor::new();
    executor.fail("brief", 1);
    let config = EngineConfig {
        failed_policy: FailedTaskPolicy::Block,
        ..EngineConfig::default()
    };
    let engine = engine_with(
        report_table(),
        executor.clone(),
        Arc::new(InMemoryStateStore::new()),
        config,
    );

    engine.run().await.unwrap();
    let blocked = engine.run().await.unwrap();
    assert!(blocked.is_noop());
    assert_eq!(executor.calls_for("brief"), 1);

    let report = engine.status_report().await;
    assert!(report.blocked[0].remediation.contains("reflow clear brief"));

    let err = engine.clear_failed("draft").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFailed(_)));
    let err = engine.clear_failed("appendix").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownTask(_)));

    let cleared = engine.clear_failed("brief").await.unwrap();
    assert_eq!(cleared.completed, vec!["brief", "draft"]);
    assert_eq!(
        engine.list_versions().await.last().map(|v| v.trigger.clone()),
        Some(VersionTrigger::Rerun)
    );
}

#[tokio::test]
async fn retry_strategy_recovers_transient_failures() {
    let executor = RecordingExecutor::new();
    executor.fail("brief", 2);
    let engine = ExecutionEngine::builder(report_table())
        .executor(executor.clone())
        .placeholder(Arc::new(common::EchoPlaceholder))
        .retry_strategy(Arc::new(ImmediateRetry { max: 3 }))
        .build()
        .unwrap();

    engine.run().await.unwrap();

    let state = engine.state().await;
    let brief = state.output("brief").unwrap();
    assert_eq!(brief.status, TaskStatus::Completed);
    assert_eq!(brief.metadata.attempts, 3);
    assert_eq!(executor.calls_for("brief"), 3);
}

#[tokio::test]
async fn spawn_failure_is_not_retried() {
    let executor = RecordingExecutor::new();
    executor.fail_with(
        "brief",
        5,
        ExecutionError::Spawn {
            task_id: "brief".into(),
            message: "generator: not found".into(),
        },
    );
    let engine = ExecutionEngine::builder(report_table())
        .executor(executor.clone())
        .placeholder(Arc::new(common::EchoPlaceholder))
        .retry_strategy(Arc::new(ImmediateRetry { max: 3 }))
        .build()
        .unwrap();

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.failed, vec!["brief"]);
    assert_eq!(executor.calls_for("brief"), 1);
}

#[tokio::test]
async fn failure_mentioning_spawn_is_still_retried() {
    let executor = RecordingExecutor::new();
    executor.fail_with(
        "brief",
        2,
        ExecutionError::failed("brief", "failed to spawn executor helper thread"),
    );
    let engine = ExecutionEngine::builder(report_table())
        .executor(executor.clone())
        .placeholder(Arc::new(common::EchoPlaceholder))
        .retry_strategy(Arc::new(ImmediateRetry { max: 3 }))
        .build()
        .unwrap();

    engine.run().await.unwrap();

    let state = engine.state().await;
    assert_eq!(state.output("brief").unwrap().status, TaskStatus::Completed);
    assert_eq!(executor.calls_for("brief"), 3);
}

#[tokio::test]
async fn slow_executor_times_out_as_failure() {
    let executor = RecordingExecutor::new();
    executor.stall("brief", Duration::from_millis(500));
    let config = EngineConfig {
        task_timeout_ms: 20,
        ..EngineConfig::default()
    };
    let engine = engine_with(
        report_table(),
        executor,
        Arc::new(InMemoryStateStore::new()),
        config,
    );

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.failed, vec!["brief"]);
    let state = engine.state().await;
    let error = state.output("brief").unwrap().metadata.error.clone().unwrap();
    assert!(error.contains("timed out"), "{error}");
}

#[tokio::test]
async fn batch_respects_concurrency_limit() {
    let tasks = (0..6)
        .map(|i| TaskDefinition::new(format!("section-{i}")))
        .collect();
    let executor = RecordingExecutor::new();
    for i in 0..6 {
        executor.stall(&format!("section-{i}"), Duration::from_millis(20));
    }
    let config = EngineConfig {
        max_concurrency: 2,
        ..EngineConfig::default()
    };
    let engine = engine_with(
        TaskTable::new(tasks),
        executor.clone(),
        Arc::new(InMemoryStateStore::new()),
        config,
    );

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.executions, 6);
    assert!(executor.peak_concurrency() <= 2);
    assert_eq!(summary.completed.len(), 6);
    // Committed in definition order regardless of finish order.
    assert_eq!(summary.completed[0], "section-0");
    assert_eq!(summary.completed[5], "section-5");
}

#[tokio::test]
async fn persistence_failure_halts_engine() {
    let store = FlakyStore::new();
    let engine = engine_with(
        report_table(),
        RecordingExecutor::new(),
        store.clone(),
        EngineConfig::default(),
    );
    engine.run().await.unwrap();
    assert!(store.state_saves() >= 4);

    store.break_writes();
    let err = engine
        .apply_input(InputEvent::new("interview", json!({ "text": "notes" })))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(engine.is_halted());

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, EngineError::Halted));
    let err = engine.flush().await.unwrap_err();
    assert!(matches!(err, EngineError::Halted));
}

#[tokio::test]
async fn restart_resumes_from_persisted_documents() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(FileStateStore::in_dir(temp_dir.path()));

    let executor = RecordingExecutor::new();
    let first = engine_with(
        report_table(),
        executor.clone(),
        store.clone(),
        EngineConfig::default(),
    );
    first.run().await.unwrap();
    let saved = first.state().await;
    drop(first);

    let second = engine_with(report_table(), executor.clone(), store, EngineConfig::default());
    let restored = second.state().await;
    for (id, output) in &saved.outputs {
        let loaded = restored.output(id).unwrap();
        assert_eq!((loaded.status, loaded.version), (output.status, output.version));
    }
    assert_eq!(restored.paused, saved.paused);

    let summary = second.run().await.unwrap();
    assert!(summary.is_noop());
    assert_eq!(executor.calls().len(), 2);
    assert_eq!(second.current_version().await.as_deref(), Some("v1"));
}

#[tokio::test]
async fn shutdown_mid_batch_persists_in_flight_results() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(FileStateStore::in_dir(temp_dir.path()));
    let tasks = vec![
        TaskDefinition::new("outline"),
        TaskDefinition::new("sources"),
        TaskDefinition::new("body").depends_on(["outline", "sources"]),
    ];
    let executor = RecordingExecutor::new();
    executor.stall("outline", Duration::from_millis(150));
    executor.stall("sources", Duration::from_millis(150));
    let engine = engine_with(
        TaskTable::new(tasks.clone()),
        executor.clone(),
        store.clone(),
        EngineConfig::default(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();
    };
    let (summary, ()) = tokio::join!(engine.run_with_shutdown(shutdown_rx), signal);
    let summary = summary.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.completed, vec!["outline", "sources"]);
    assert_eq!(summary.version.as_deref(), Some("v1"));
    assert_eq!(executor.calls_for("body"), 0);
    drop(engine);

    let restarted = engine_with(
        TaskTable::new(tasks),
        executor.clone(),
        store,
        EngineConfig::default(),
    );
    let state = restarted.state().await;
    assert_eq!(state.status_of("outline"), TaskStatus::Completed);
    assert_eq!(state.status_of("sources"), TaskStatus::Completed);
    assert_eq!(state.status_of("body"), TaskStatus::NotStarted);
    assert_eq!(restarted.current_version().await.as_deref(), Some("v1"));

    let resumed = restarted.run().await.unwrap();
    assert!(!resumed.interrupted);
    assert_eq!(resumed.completed, vec!["body"]);
    assert_eq!(executor.calls_for("outline"), 1);
}

#[tokio::test]
async fn restart_loads_long_regeneration_history() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(FileStateStore::in_dir(temp_dir.path()));

    let first = engine_with(
        report_table(),
        RecordingExecutor::new(),
        store.clone(),
        EngineConfig::default(),
    );
    first.run().await.unwrap();
    for round in 0..140 {
        first
            .apply_input(InputEvent::new("interview", json!({ "text": round })))
            .await
            .unwrap();
    }
    assert_eq!(first.state().await.output("interview").unwrap().version, 141);
    drop(first);

    let second = engine_with(
        report_table(),
        RecordingExecutor::new(),
        store,
        EngineConfig::default(),
    );
    let restored = second.state().await;
    let interview = restored.output("interview").unwrap();
    assert_eq!(interview.version, 141);
    assert_eq!(interview.history().count(), 141);
    assert!(interview.history().last().unwrap().is_placeholder);
}

#[test]
fn invalid_table_is_rejected_with_every_problem() {
    let table = TaskTable::new(vec![
        TaskDefinition::new("a").depends_on(["missing"]),
        TaskDefinition::new("b").depends_on(["c"]),
        TaskDefinition::new("c").depends_on(["b"]),
    ]);

    let err = match ExecutionEngine::builder(table)
        .executor(RecordingExecutor::new())
        .placeholder(Arc::new(common::EchoPlaceholder))
        .build()
    {
        Ok(_) => panic!("invalid table accepted"),
        Err(err) => err,
    };

    match err {
        EngineError::Graph(graph) => assert_eq!(graph.problems().len(), 2),
        other => panic!("unexpected error {other:?}"),
    }
}
