use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tally::notification::{NotificationSink, SubagentNotification, WorkItemAck};
use tally::orchestration::{
    RegistrySnapshot, SNAPSHOT_VERSION, SubagentEventKind, SubagentInput, SubagentRegistry,
    SubagentStatus, TaskNotification, TaskNotificationStatus, TrackedSubagent, listener,
};

// ─── Helpers ──────────────────────────────────────────────────────────

fn input(kind: &str) -> SubagentInput {
    SubagentInput {
        subagent_type: kind.to_string(),
        description: "investigate flaky test".to_string(),
        prompt: "find out why ci fails".to_string(),
        ..Default::default()
    }
}

#[derive(Default)]
struct RecordingSink {
    subagents: Mutex<Vec<SubagentNotification>>,
}

impl NotificationSink for RecordingSink {
    fn subagent(&self, notification: SubagentNotification) {
        self.subagents.lock().unwrap().push(notification);
    }

    fn work_item(&self, _ack: WorkItemAck) {}
}

fn counter(reg: &SubagentRegistry, kind: SubagentEventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    reg.add_event_listener(
        kind,
        listener(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    count
}

// ============================================================
// Lifecycle
// ============================================================

#[test]
fn test_full_lifecycle_sets_timestamps_in_order() {
    let reg = SubagentRegistry::new();
    let tracked = reg.track_subagent("t1", "s1", &input("explore"), Some("tool-1".into()));
    assert_eq!(tracked.status, SubagentStatus::Pending);
    assert!(tracked.started_at.is_none());

    reg.start_subagent("t1");
    let running = reg.get_subagent("t1").unwrap();
    assert_eq!(running.status, SubagentStatus::Running);
    assert!(running.started_at.unwrap() >= running.created_at);

    reg.complete_subagent("t1", Some("done".into()), Some("agent-9".into()));
    let done = reg.get_subagent("t1").unwrap();
    assert_eq!(done.status, SubagentStatus::Completed);
    assert_eq!(done.result.as_deref(), Some("done"));
    assert_eq!(done.agent_id.as_deref(), Some("agent-9"));
    assert!(done.completed_at.unwrap() >= done.started_at.unwrap());
    assert_eq!(done.parent_tool_use_id.as_deref(), Some("tool-1"));
}

#[test]
fn test_unknown_ids_are_no_ops() {
    let reg = SubagentRegistry::new();
    reg.start_subagent("ghost");
    reg.complete_subagent("ghost", None, None);
    reg.fail_subagent("ghost", "nope");
    reg.cancel_subagent("ghost");
    reg.update_progress("ghost", None);
    assert!(reg.is_empty());
    assert!(reg.get_subagent("ghost").is_none());
}

#[test]
fn test_fail_and_cancel_record_outcome() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("f", "s1", &input("explore"), None);
    reg.track_subagent("c", "s1", &input("explore"), None);
    reg.start_subagent("f");
    reg.start_subagent("c");

    reg.fail_subagent("f", "model refused");
    reg.cancel_subagent("c");

    let failed = reg.get_subagent("f").unwrap();
    assert_eq!(failed.status, SubagentStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("model refused"));
    assert_eq!(reg.get_subagent("c").unwrap().status, SubagentStatus::Cancelled);
    assert!(reg.get_running_subagents().is_empty());
}

#[test]
fn test_session_queries() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("a", "s1", &input("explore"), None);
    reg.track_subagent("b", "s1", &input("explore"), None);
    reg.track_subagent("c", "s2", &input("plan"), None);
    reg.start_subagent("a");
    reg.start_subagent("c");

    assert_eq!(reg.get_session_subagents("s1").len(), 2);
    assert_eq!(reg.get_running_subagents().len(), 2);
    let running_s1 = reg.get_running_subagents_for_session("s1");
    assert_eq!(running_s1.len(), 1);
    assert_eq!(running_s1[0].id, "a");
    assert_eq!(reg.get_active_subagent("s1").unwrap().id, "a");
    assert!(reg.get_active_subagent("s3").is_none());
}

// ============================================================
// Resume
// ============================================================

#[test]
fn test_resumable_tasks_need_agent_id_and_terminal_status() {
    let reg = SubagentRegistry::new();
    for id in ["done", "failed", "cancelled", "running", "no-agent"] {
        reg.track_subagent(id, "s1", &input("explore"), None);
        reg.start_subagent(id);
    }
    reg.complete_subagent("done", None, Some("ag-done".into()));
    reg.handle_task_notification(TaskNotification {
        task_id: "failed".into(),
        status: TaskNotificationStatus::Failed,
        output_file: None,
        summary: None,
        result: None,
        error: Some("crashed".into()),
        agent_id: Some("ag-failed".into()),
        raw: None,
    });
    reg.complete_subagent("cancelled", None, Some("ag-cancelled".into()));
    reg.cancel_subagent("cancelled");
    reg.complete_subagent("no-agent", None, None);

    let mut ids: Vec<String> = reg
        .get_resumable_tasks()
        .into_iter()
        .map(|t| t.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["done", "failed"]);
    assert_eq!(reg.find_by_agent_id("ag-done").unwrap().id, "done");
    assert!(reg.find_by_agent_id("unknown").is_none());
}

#[test]
fn test_resume_links_original_task() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("first", "s1", &input("explore"), None);
    reg.start_subagent("first");
    reg.complete_subagent("first", None, Some("agent-1".into()));

    let resumed = SubagentInput {
        resume: Some("agent-1".into()),
        ..input("explore")
    };
    let second = reg.track_subagent("second", "s1", &resumed, None);
    assert!(second.is_resumed);
    assert_eq!(second.original_task_id.as_deref(), Some("first"));

    let unknown = SubagentInput {
        resume: Some("agent-x".into()),
        ..input("explore")
    };
    let third = reg.track_subagent("third", "s1", &unknown, None);
    assert!(third.is_resumed);
    assert!(third.original_task_id.is_none());
}

#[test]
fn test_replaced_agent_id_drops_old_handle() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("t1", "s1", &input("explore"), None);
    reg.start_subagent("t1");
    reg.complete_subagent("t1", None, Some("agent-1".into()));
    reg.handle_task_notification(TaskNotification {
        task_id: "t1".into(),
        status: TaskNotificationStatus::Completed,
        output_file: None,
        summary: None,
        result: None,
        error: None,
        agent_id: Some("agent-2".into()),
        raw: None,
    });

    assert!(reg.find_by_agent_id("agent-1").is_none());
    assert_eq!(reg.find_by_agent_id("agent-2").unwrap().id, "t1");

    // Re-finishing with the same handle keeps it resolvable.
    reg.complete_subagent("t1", None, None);
    assert_eq!(reg.find_by_agent_id("agent-2").unwrap().id, "t1");
}

// ============================================================
// Task notifications
// ============================================================

#[test]
fn test_task_notification_completes_background_task() {
    let sink = Arc::new(RecordingSink::default());
    let reg = SubagentRegistry::with_sink(sink.clone());
    reg.track_subagent(
        "bg",
        "s1",
        &SubagentInput {
            run_in_background: true,
            ..input("explore")
        },
        None,
    );
    reg.start_subagent("bg");

    let raw = json!({"task_id": "bg", "status": "completed"});
    reg.handle_task_notification(TaskNotification {
        task_id: "bg".into(),
        status: TaskNotificationStatus::Completed,
        output_file: Some("/tmp/bg.out".into()),
        summary: Some("all green".into()),
        result: Some("42 tests passed".into()),
        error: None,
        agent_id: None,
        raw: Some(raw.clone()),
    });

    let bg = reg.get_subagent("bg").unwrap();
    assert_eq!(bg.status, SubagentStatus::Completed);
    assert_eq!(bg.output_file.as_deref(), Some("/tmp/bg.out"));
    assert_eq!(bg.summary.as_deref(), Some("all green"));
    assert_eq!(bg.result.as_deref(), Some("42 tests passed"));

    let sent = sink.subagents.lock().unwrap();
    let last = sent.last().unwrap();
    assert_eq!(last.event_type, "subagent_completed");
    assert_eq!(last.task_notification.as_ref(), Some(&raw));
    assert!(last.duration_ms.unwrap() >= 0);
}

#[test]
fn test_failed_notification_falls_back_to_summary() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("bg", "s1", &input("explore"), None);
    reg.start_subagent("bg");
    reg.handle_task_notification(TaskNotification {
        task_id: "bg".into(),
        status: TaskNotificationStatus::Failed,
        output_file: None,
        summary: Some("out of memory".into()),
        result: None,
        error: None,
        agent_id: None,
        raw: None,
    });
    assert_eq!(
        reg.get_subagent("bg").unwrap().error.as_deref(),
        Some("out of memory")
    );
}

#[test]
fn test_stopped_notification() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("bg", "s1", &input("explore"), None);
    reg.start_subagent("bg");
    reg.handle_task_notification(TaskNotification {
        task_id: "bg".into(),
        status: TaskNotificationStatus::Stopped,
        output_file: None,
        summary: None,
        result: None,
        error: None,
        agent_id: None,
        raw: None,
    });
    assert_eq!(reg.get_subagent("bg").unwrap().status, SubagentStatus::Stopped);
}

// ============================================================
// Events and notifications
// ============================================================

#[test]
fn test_events_fire_per_kind() {
    let reg = SubagentRegistry::new();
    let created = counter(&reg, SubagentEventKind::Created);
    let started = counter(&reg, SubagentEventKind::Started);
    let completed = counter(&reg, SubagentEventKind::Completed);
    let progress = counter(&reg, SubagentEventKind::Progress);

    reg.track_subagent("t1", "s1", &input("explore"), None);
    reg.update_progress("t1", Some(json!({"step": 0})));
    reg.start_subagent("t1");
    reg.update_progress("t1", Some(json!({"step": 1})));
    reg.complete_subagent("t1", None, None);
    reg.update_progress("t1", Some(json!({"step": 2})));

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(progress.load(Ordering::SeqCst), 1, "progress only while running");
}

#[test]
fn test_progress_does_not_change_status() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("t1", "s1", &input("explore"), None);
    reg.start_subagent("t1");
    reg.update_progress("t1", Some(json!({"pct": 50})));
    assert_eq!(reg.get_subagent("t1").unwrap().status, SubagentStatus::Running);
}

#[test]
fn test_failing_listener_does_not_block_others() {
    let reg = SubagentRegistry::new();
    reg.add_event_listener(
        SubagentEventKind::Started,
        listener(|_| anyhow::bail!("listener exploded")),
    );
    reg.add_event_listener(
        SubagentEventKind::Started,
        listener(|_| panic!("listener panicked")),
    );
    let started = counter(&reg, SubagentEventKind::Started);

    reg.track_subagent("t1", "s1", &input("explore"), None);
    reg.start_subagent("t1");

    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(reg.get_subagent("t1").unwrap().status, SubagentStatus::Running);
}

#[test]
fn test_removed_listener_is_not_called() {
    let reg = SubagentRegistry::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let id = reg.add_event_listener(
        SubagentEventKind::Created,
        listener(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    reg.track_subagent("a", "s1", &input("explore"), None);
    assert!(reg.remove_event_listener(SubagentEventKind::Created, id));
    assert!(!reg.remove_event_listener(SubagentEventKind::Created, id));
    reg.track_subagent("b", "s1", &input("explore"), None);

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sink_sees_start_and_finish() {
    let sink = Arc::new(RecordingSink::default());
    let reg = SubagentRegistry::with_sink(sink.clone());
    reg.track_subagent("t1", "s1", &input("explore"), None);
    reg.start_subagent("t1");
    reg.fail_subagent("t1", "boom");

    let sent = sink.subagents.lock().unwrap();
    let kinds: Vec<&str> = sent.iter().map(|n| n.event_type.as_str()).collect();
    assert_eq!(kinds, vec!["subagent_started", "subagent_failed"]);
    assert_eq!(sent[1].status, SubagentStatus::Failed);
    assert_eq!(sent[1].parent_session_id, "s1");
}

#[test]
fn test_panicking_finish_hook_is_isolated() {
    let reg = SubagentRegistry::new();
    let runs = Arc::new(AtomicUsize::new(0));
    reg.track_subagent("t1", "s1", &input("explore"), None);
    reg.on_finish("t1", Box::new(|_: &TrackedSubagent| panic!("hook exploded")));
    let r = runs.clone();
    reg.on_finish(
        "t1",
        Box::new(move |s: &TrackedSubagent| {
            assert_eq!(s.status, SubagentStatus::Completed);
            r.fetch_add(1, Ordering::SeqCst);
        }),
    );

    reg.start_subagent("t1");
    reg.complete_subagent("t1", Some("done".into()), None);

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(reg.get_subagent("t1").unwrap().status, SubagentStatus::Completed);
}

// ============================================================
// Cleanup
// ============================================================

#[test]
fn test_cleanup_never_removes_live_entries() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("pending", "s1", &input("explore"), None);
    reg.track_subagent("running", "s1", &input("explore"), None);
    reg.track_subagent("done", "s1", &input("explore"), None);
    reg.start_subagent("running");
    reg.start_subagent("done");
    reg.complete_subagent("done", None, None);

    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(reg.cleanup(Duration::ZERO), 1);
    assert!(reg.is_subagent("pending"));
    assert!(reg.is_subagent("running"));
    assert!(!reg.is_subagent("done"));
    assert!(reg.get_session_subagents("s1").iter().all(|t| t.id != "done"));
}

#[test]
fn test_cleanup_respects_max_age() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("done", "s1", &input("explore"), None);
    reg.complete_subagent("done", None, None);
    assert_eq!(reg.cleanup(Duration::from_secs(3600)), 0);
    assert!(reg.is_subagent("done"));
}

// ============================================================
// Export / import
// ============================================================

#[test]
fn test_export_import_preserves_entries_and_indexes() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("a", "s1", &input("explore"), None);
    reg.track_subagent("b", "s2", &input("plan"), None);
    reg.start_subagent("b");
    reg.complete_subagent("b", Some("ok".into()), Some("agent-b".into()));

    let snapshot = reg.export_state();
    assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    assert_eq!(snapshot.tasks.len(), 2);

    let restored = SubagentRegistry::new();
    assert_eq!(restored.import_state(snapshot).unwrap(), 2);
    assert_eq!(restored.get_subagent("a"), reg.get_subagent("a"));
    assert_eq!(restored.get_subagent("b"), reg.get_subagent("b"));
    assert_eq!(restored.get_session_subagents("s2").len(), 1);
    assert_eq!(restored.find_by_agent_id("agent-b").unwrap().id, "b");
}

#[test]
fn test_import_replaces_existing_entries() {
    let reg = SubagentRegistry::new();
    reg.track_subagent("old", "s1", &input("explore"), None);

    let source = SubagentRegistry::new();
    source.track_subagent("new", "s9", &input("explore"), None);
    reg.import_state(source.export_state()).unwrap();

    assert!(!reg.is_subagent("old"));
    assert!(reg.is_subagent("new"));
    assert!(reg.get_session_subagents("s1").is_empty());
}

#[test]
fn test_import_rejects_version_mismatch() {
    let reg = SubagentRegistry::new();
    let result = reg.import_state(RegistrySnapshot {
        version: 99,
        tasks: vec![],
        last_updated: 0,
    });
    assert!(result.is_err());
    assert!(reg.is_empty());
}
