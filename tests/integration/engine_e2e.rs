//! End-to-end engine scenarios: lifecycle, dependencies, parsing,
//! search and statistics working together.

use kanri::core::graph::EdgeKind;
use kanri::core::task::{Priority, TaskId, TaskStatus};
use kanri::error::Error;
use kanri::store::{DomainEvent, NewTask, TaskPatch};

use crate::fixtures::{chain, engine, task_with_hours};

/// Given a chain A -> B -> C with hours 2, 3, 5
/// When the dependencies are analyzed
/// Then the critical path is [A, B, C] with total duration 10
#[test]
fn test_critical_path_over_chain() {
    let engine = engine();
    let ids = chain(&engine, &[("a", 2.0), ("b", 3.0), ("c", 5.0)]);

    let analysis = engine.analyze_dependencies();
    assert_eq!(analysis.path, ids);
    assert_eq!(analysis.total_duration, 10.0);
}

/// Given A pending with no deps and B blocked by A
/// When A completes
/// Then B shows up in the next ready set
#[test]
fn test_ready_frontier_advances_with_completion() {
    let engine = engine();
    let a = task_with_hours(&engine, "a", 1.0);
    let b = task_with_hours(&engine, "b", 1.0);
    engine
        .add_dependency(&b.id, &a.id, EdgeKind::BlockedBy)
        .unwrap();

    let ready: Vec<TaskId> = engine.get_ready_tasks().iter().map(|t| t.id).collect();
    assert_eq!(ready, vec![a.id]);

    engine
        .update_task(
            &a.id,
            1,
            TaskPatch {
                status: Some(TaskStatus::Completed),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    let ready: Vec<TaskId> = engine.get_ready_tasks().iter().map(|t| t.id).collect();
    assert_eq!(ready, vec![b.id]);
}

/// Given A with a transitive blocks path to C
/// When a blocks edge from C to A is added
/// Then the call fails with CycleDetected and the graph is unchanged,
/// no matter how often it is retried
#[test]
fn test_transitive_cycle_rejection_is_idempotent() {
    let engine = engine();
    let ids = chain(&engine, &[("a", 1.0), ("b", 1.0), ("c", 1.0)]);

    for _ in 0..3 {
        let result = engine.add_dependency(&ids[2], &ids[0], EdgeKind::Blocks);
        assert!(matches!(result, Err(Error::CycleDetected { .. })));
        assert_eq!(engine.list_dependencies().len(), 2);
    }

    // Analysis still sees the original chain
    let analysis = engine.analyze_dependencies();
    assert_eq!(analysis.path, ids);
}

/// Natural-language parsing feeds task creation end to end.
#[test]
fn test_parse_natural_language_to_task() {
    let engine = engine();
    let parsed = engine.parse_natural_language(
        "Build a user registration system with email verification. \
         This is a critical security feature.",
        None,
    );
    assert_eq!(parsed.draft.priority, Priority::Critical);
    assert!(parsed.draft.tags.contains("security"));
    assert!(!parsed.complexity.low_confidence);

    let task = engine
        .create_task_from_text(
            "Build a user registration system with email verification. \
             This is a critical security feature.",
            None,
        )
        .unwrap();
    assert_eq!(task.priority, Priority::Critical);
    assert!(task.tags.contains("security"));

    // The stored task is searchable immediately
    let found = engine.search_tasks("registration", 10);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, task.id);
}

/// search_tasks only returns matching tasks, ranked.
#[test]
fn test_search_ranks_title_matches() {
    let engine = engine();
    engine
        .create_task(NewTask::new("Authentication Task"))
        .unwrap();
    engine.create_task(NewTask::new("Database Task")).unwrap();

    let results = engine.search_tasks("authentication", 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Authentication Task");
}

/// Version conflicts surface to the caller and change nothing.
#[test]
fn test_concurrent_update_detected() {
    let engine = engine();
    let task = task_with_hours(&engine, "contended", 1.0);

    // Two readers share version 1; the first update wins
    engine
        .update_task(
            &task.id,
            1,
            TaskPatch {
                status: Some(TaskStatus::InProgress),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    let stale = engine.update_task(
        &task.id,
        1,
        TaskPatch {
            status: Some(TaskStatus::Cancelled),
            ..TaskPatch::default()
        },
    );
    assert!(matches!(stale, Err(Error::VersionConflict { .. })));
    assert_eq!(
        engine.get_task(&task.id).unwrap().status,
        TaskStatus::InProgress
    );
}

/// Statistics reflect lifecycle changes on demand.
#[test]
fn test_statistics_track_lifecycle() {
    let engine = engine();
    let a = task_with_hours(&engine, "a", 1.0);
    task_with_hours(&engine, "b", 1.0);

    engine
        .update_task(
            &a.id,
            1,
            TaskPatch {
                status: Some(TaskStatus::Completed),
                priority: Some(Priority::Critical),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    let stats = engine.get_task_statistics();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_status.get(&TaskStatus::Pending), Some(&1));
    assert_eq!(stats.by_status.get(&TaskStatus::Completed), Some(&1));
    assert_eq!(stats.by_priority.get(&Priority::Critical), Some(&1));
}

/// Domain events stream out in order as collaborators mutate state.
#[test]
fn test_event_stream_reflects_mutations() {
    let engine = engine();
    let rx = engine.subscribe();

    let a = task_with_hours(&engine, "a", 1.0);
    let b = task_with_hours(&engine, "b", 1.0);
    engine
        .add_dependency(&a.id, &b.id, EdgeKind::Blocks)
        .unwrap();

    let events: Vec<DomainEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            DomainEvent::TaskCreated { task_id: a.id },
            DomainEvent::TaskCreated { task_id: b.id },
            DomainEvent::DependencyAdded {
                from: a.id,
                to: b.id,
                kind: EdgeKind::Blocks,
            },
        ]
    );
}

/// Cancelled prerequisites stop blocking their dependents.
#[test]
fn test_cancelled_blocker_unblocks_dependent() {
    let engine = engine();
    let ids = chain(&engine, &[("a", 1.0), ("b", 1.0)]);

    engine
        .update_task(
            &ids[0],
            1,
            TaskPatch {
                status: Some(TaskStatus::Cancelled),
                ..TaskPatch::default()
            },
        )
        .unwrap();

    let ready: Vec<TaskId> = engine.get_ready_tasks().iter().map(|t| t.id).collect();
    assert_eq!(ready, vec![ids[1]]);
}
