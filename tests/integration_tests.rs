//! End-to-end scenarios through the orchestrator
//!
//! Each test wires a real orchestrator to mock tools from `weft-testing`
//! and checks what a caller observes: result order, concurrency, permission
//! outcomes, cancellation and what ends up recorded on the thread.

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use weft::core::Access;
use weft::{
    ActionStatus, Decision, ErrorKind, GrantExpiry, GrantScope, InMemoryRemoteStore, Orchestrator,
    Role, ToolRegistry, WeftConfig,
};
use weft_testing::{
    ConcurrencyProbe, DelayedTool, FailingTool, PanickingTool, StubbornTool, VerboseTool,
};

fn config() -> WeftConfig {
    let mut config = WeftConfig::default();
    config.permissions.workspace_root = "/work".into();
    config.permissions.interactive = false;
    config
}

fn build(config: WeftConfig, registry: ToolRegistry) -> Orchestrator {
    Orchestrator::new(config, registry, Arc::new(InMemoryRemoteStore::new()))
        .expect("orchestrator should build")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_only_window_keeps_request_order() {
    let probe = ConcurrencyProbe::new();
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(
            DelayedTool::read_only("lookup").with_probe(Arc::clone(&probe)),
        ))
        .unwrap();
    let mut config = config();
    config.scheduler.max_concurrency = 2;
    let orch = build(config, registry);
    let thread = orch.create_thread();

    let requests: Vec<_> = [50, 10, 30, 5, 20]
        .iter()
        .enumerate()
        .map(|(i, delay)| {
            orch.request(
                "lookup",
                json!({"delay_ms": delay, "label": (i + 1).to_string()}),
            )
            .unwrap()
        })
        .collect();

    let results = orch
        .submit_batch(thread.id, requests)
        .await
        .unwrap()
        .collect_ordered()
        .await;

    let labels: Vec<&str> = results.iter().filter_map(|r| r.output()).collect();
    assert_eq!(labels, vec!["1", "2", "3", "4", "5"]);
    assert!(probe.peak() <= 2, "peak was {}", probe.peak());
    assert_eq!(probe.completed(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stream_yields_completion_order() {
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(DelayedTool::read_only("lookup")))
        .unwrap();
    let orch = build(config(), registry);
    let thread = orch.create_thread();

    let mut run = orch
        .submit_batch(
            thread.id,
            vec![
                orch.request("lookup", json!({"delay_ms": 80, "label": "slow"}))
                    .unwrap(),
                orch.request("lookup", json!({"delay_ms": 5, "label": "fast"}))
                    .unwrap(),
            ],
        )
        .await
        .unwrap();

    let first = run.next().await.unwrap();
    assert_eq!(first.output(), Some("fast"));
    let second = run.next().await.unwrap();
    assert_eq!(second.output(), Some("slow"));
    assert!(run.next().await.is_none());
}

#[tokio::test]
async fn test_cancel_mid_flight() {
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(DelayedTool::mutating("step")))
        .unwrap();
    let orch = build(config(), registry);
    let thread = orch.create_thread();

    let mut run = orch
        .submit_batch(
            thread.id,
            vec![
                orch.request("step", json!({"delay_ms": 10})).unwrap(),
                orch.request("step", json!({"delay_ms": 2000})).unwrap(),
                orch.request("step", json!({"delay_ms": 2000})).unwrap(),
            ],
        )
        .await
        .unwrap();

    let first = run.next().await.unwrap();
    assert!(first.is_success());
    run.cancel();

    let results = run.collect_ordered().await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, ActionStatus::Success);
    assert_eq!(results[1].status, ActionStatus::Cancelled);
    assert_eq!(results[2].status, ActionStatus::Cancelled);
}

#[tokio::test]
async fn test_non_cooperative_tool_is_aborted_after_grace_period() {
    let stubborn = StubbornTool::new("stubborn");
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(stubborn.clone()))
        .unwrap();
    let mut config = config();
    config.scheduler.grace_period = Duration::from_millis(50);
    let orch = build(config, registry);
    let thread = orch.create_thread();

    let run = orch
        .submit_batch(
            thread.id,
            vec![orch.request("stubborn", json!({"delay_ms": 5000})).unwrap()],
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    run.cancel();

    let results = tokio::time::timeout(Duration::from_secs(2), run.collect_ordered())
        .await
        .expect("grace period should bound the batch");
    assert_eq!(results[0].failure_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(stubborn.finished(), 0);
}

#[tokio::test]
async fn test_failures_stay_inside_their_results() {
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(DelayedTool::read_only("ok")))
        .unwrap()
        .with_tool(Arc::new(FailingTool::new("broken", "disk on fire")))
        .unwrap()
        .with_tool(Arc::new(PanickingTool::new("panicky")))
        .unwrap()
        .with_tool(Arc::new(VerboseTool::new("chatty")))
        .unwrap();
    let mut config = config();
    config.limits.max_output_bytes = 16;
    let orch = build(config, registry);
    let thread = orch.create_thread();

    let results = orch
        .submit_batch(
            thread.id,
            vec![
                orch.request("ok", json!({})).unwrap(),
                orch.request("broken", json!({})).unwrap(),
                orch.request("panicky", json!({})).unwrap(),
                orch.request("chatty", json!({"bytes": 64})).unwrap(),
            ],
        )
        .await
        .unwrap()
        .collect_ordered()
        .await;

    assert!(results[0].is_success());
    assert_eq!(results[1].failure_kind(), Some(ErrorKind::OperationFailed));
    assert_eq!(results[2].failure_kind(), Some(ErrorKind::OperationFailed));
    assert_eq!(results[3].failure_kind(), Some(ErrorKind::ResourceExceeded));

    let recorded = orch.thread(thread.id).await.unwrap();
    assert_eq!(recorded.messages.len(), 4);
    assert!(recorded.messages.iter().all(|m| m.role == Role::Tool));
}

#[tokio::test]
async fn test_path_grants_follow_normalized_prefixes() {
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(DelayedTool::mutating("edit").requiring_permission()))
        .unwrap();
    let orch = build(config(), registry);
    orch.grant(
        GrantScope::path(std::path::Path::new("/repo"), Access::Write),
        GrantExpiry::Session,
    )
    .await
    .unwrap();
    let thread = orch.create_thread();

    let results = orch
        .submit_batch(
            thread.id,
            vec![
                orch.request("edit", json!({"path": "/repo/src/main.go"})).unwrap(),
                orch.request("edit", json!({"path": "/other/main.go"})).unwrap(),
                orch.request("edit", json!({"path": "/repo/../etc/passwd"})).unwrap(),
                orch.request("edit", json!({"path": "/repository/x"})).unwrap(),
            ],
        )
        .await
        .unwrap()
        .collect_ordered()
        .await;

    assert!(results[0].is_success());
    for denied in &results[1..] {
        assert_eq!(denied.failure_kind(), Some(ErrorKind::PermissionDenied));
    }
}

#[tokio::test]
async fn test_denied_tools_never_prompt() {
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(DelayedTool::mutating("nuke").requiring_permission()))
        .unwrap();
    let mut config = config();
    config.permissions.interactive = true;
    config.permissions.deny_tools = vec!["nuke".to_string()];
    let orch = build(config, registry);
    let thread = orch.create_thread();

    let results = orch
        .submit_batch(
            thread.id,
            vec![orch.request("nuke", json!({"path": "/work/a"})).unwrap()],
        )
        .await
        .unwrap()
        .collect_ordered()
        .await;

    assert_eq!(results[0].failure_kind(), Some(ErrorKind::PermissionDenied));
    assert!(orch.pending_prompts().is_empty());
}

#[tokio::test]
async fn test_prompt_with_chosen_scope_grants_it() {
    let registry = ToolRegistry::new()
        .with_tool(Arc::new(DelayedTool::mutating("edit").requiring_permission()))
        .unwrap();
    let mut config = config();
    config.permissions.interactive = true;
    let orch = build(config, registry);
    let thread = orch.create_thread();
    let mut prompts = orch.prompts();

    let run = orch
        .submit_batch(
            thread.id,
            vec![orch.request("edit", json!({"path": "/work/src/lib.rs"})).unwrap()],
        )
        .await
        .unwrap();

    let prompt = prompts.recv().await.unwrap();
    assert!(!prompt.suggested_scopes.is_empty());
    let widest = prompt.suggested_scopes.last().cloned().unwrap();
    orch.decide_with_scope(
        prompt.request_id,
        Decision::Approved,
        widest.clone(),
        GrantExpiry::Session,
    )
    .await
    .unwrap();

    let results = run.collect_ordered().await;
    assert!(results[0].is_success());
    let grants = orch.list_grants().await.unwrap();
    assert!(grants.iter().any(|g| g.key() == widest.key()));

    let revoked = orch.revoke(&widest.key()).await.unwrap();
    assert!(revoked);
}

#[tokio::test]
async fn test_orchestrators_do_not_share_state() {
    let first = build(config(), ToolRegistry::new());
    let second = build(config(), ToolRegistry::new());

    first
        .grant(GrantScope::tool("anything", Access::Write), GrantExpiry::Session)
        .await
        .unwrap();
    let thread = first.create_thread();

    assert!(second.list_grants().await.unwrap().is_empty());
    assert!(second.thread(thread.id).await.is_err());
    assert_eq!(second.sync().dirty_count(), 0);
    assert!(first.metrics_text().is_ok());
}
