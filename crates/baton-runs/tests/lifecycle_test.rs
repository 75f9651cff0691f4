mod common;

use std::sync::Arc;
use std::time::Duration;

use baton_persist::{MemoryStore, RunStore};
use baton_runs::{LifecycleError, RunLifecycle, RunLifecycleBuilder};
use baton_types::{
    NewRun, NewThread, RunErrorInfo, RunOutcome, RunRejection, RunStatus, StartRunInput,
    StartRunResult,
};
use common::FailingStore;

async fn lifecycle_with_thread() -> (Arc<RunLifecycle>, String) {
    let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    (Arc::new(RunLifecycle::new(store)), thread.id)
}

async fn start(lifecycle: &RunLifecycle, thread_id: &str, input: StartRunInput) -> String {
    let result = lifecycle.start_run(thread_id, input).await.unwrap();
    result.run_id().expect("run should start").to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_have_single_winner() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let lifecycle = Arc::clone(&lifecycle);
        let thread_id = thread_id.clone();
        handles.push(tokio::spawn(async move {
            lifecycle
                .start_run(&thread_id, StartRunInput::new())
                .await
                .unwrap()
        }));
    }

    let results: Vec<StartRunResult> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.started()).collect();
    assert_eq!(winners.len(), 1);
    let rejected = results
        .iter()
        .filter(|r| matches!(r.rejection(), Some(RunRejection::ConcurrentRun { .. })))
        .count();
    assert_eq!(rejected, 15);

    let thread = lifecycle.store().get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.current_run_id.as_deref(), Some(winners[0].run_id.as_str()));
}

#[tokio::test]
async fn test_second_start_reports_current_run_then_next_start_succeeds() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;

    let first = start(&lifecycle, &thread_id, StartRunInput::new()).await;

    let busy = lifecycle
        .start_run(&thread_id, StartRunInput::new())
        .await
        .unwrap();
    assert_eq!(
        busy,
        StartRunResult::Rejected(RunRejection::ConcurrentRun {
            current_run_id: Some(first.clone())
        })
    );

    lifecycle
        .complete_run(&thread_id, &first, RunOutcome::success())
        .await
        .unwrap();

    let second = start(&lifecycle, &thread_id, StartRunInput::new()).await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_unknown_thread_is_rejected() {
    let (lifecycle, _) = lifecycle_with_thread().await;
    let result = lifecycle
        .start_run("no-such-thread", StartRunInput::new())
        .await
        .unwrap();
    assert_eq!(result, StartRunResult::Rejected(RunRejection::ThreadNotFound));
}

#[tokio::test]
async fn test_round_trip_leaves_thread_idle() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let run_id = start(&lifecycle, &thread_id, StartRunInput::new().with_model("m-1")).await;

    let run = lifecycle.advance(&run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Streaming);
    assert!(run.started_at.is_some());
    let thread = lifecycle.store().get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.run_status, RunStatus::Streaming);

    let report = lifecycle
        .complete_run(&thread_id, &run_id, RunOutcome::success())
        .await
        .unwrap();
    assert!(report.lock_released);
    assert!(report.run_updated);

    let thread = lifecycle.store().get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.run_status, RunStatus::Idle);
    assert!(thread.current_run_id.is_none());
    assert_eq!(thread.last_completed_run_id.as_deref(), Some(run_id.as_str()));
    assert!(thread.last_run_error.is_none());

    let run = lifecycle.store().get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Idle);
    assert!(run.is_terminal());
    assert_eq!(run.model.as_deref(), Some("m-1"));
}

#[tokio::test]
async fn test_cancel_marks_thread_and_run_and_fires_token() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let run_id = start(&lifecycle, &thread_id, StartRunInput::new()).await;
    let token = lifecycle.cancellation_token(&run_id).unwrap();

    lifecycle.cancel_run(&thread_id, &run_id).await.unwrap();

    assert!(token.is_cancelled());
    assert!(lifecycle.cancellation_token(&run_id).is_none());

    let thread = lifecycle.store().get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.last_run_cancelled, Some(true));
    assert_eq!(thread.run_status, RunStatus::Idle);
    let run = lifecycle.store().get_run(&run_id).await.unwrap().unwrap();
    assert!(run.is_cancelled);
}

#[tokio::test]
async fn test_late_cancel_after_completion_is_noop() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let run_id = start(&lifecycle, &thread_id, StartRunInput::new()).await;

    lifecycle
        .complete_run(&thread_id, &run_id, RunOutcome::success())
        .await
        .unwrap();
    let report = lifecycle.cancel_run(&thread_id, &run_id).await.unwrap();
    assert!(report.is_noop());

    let thread = lifecycle.store().get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.last_run_cancelled, Some(false));
    let run = lifecycle.store().get_run(&run_id).await.unwrap().unwrap();
    assert!(!run.is_cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_racing_complete_and_cancel_each_write_once() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let run_id = start(&lifecycle, &thread_id, StartRunInput::new()).await;

    let complete = {
        let (lifecycle, thread_id, run_id) = (lifecycle.clone(), thread_id.clone(), run_id.clone());
        tokio::spawn(async move {
            lifecycle
                .complete_run(&thread_id, &run_id, RunOutcome::success())
                .await
        })
    };
    let cancel = {
        let (lifecycle, thread_id, run_id) = (lifecycle.clone(), thread_id.clone(), run_id.clone());
        tokio::spawn(async move { lifecycle.cancel_run(&thread_id, &run_id).await })
    };

    let a = complete.await.unwrap().unwrap();
    let b = cancel.await.unwrap().unwrap();
    assert!(a.lock_released ^ b.lock_released);
    assert!(a.run_updated ^ b.run_updated);

    let thread = lifecycle.store().get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.run_status, RunStatus::Idle);
}

#[tokio::test]
async fn test_fail_run_records_error() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let run_id = start(&lifecycle, &thread_id, StartRunInput::new()).await;

    lifecycle
        .fail_run(
            &thread_id,
            &run_id,
            RunErrorInfo::new("model timed out").with_code("timeout"),
        )
        .await
        .unwrap();

    let thread = lifecycle.store().get_thread(&thread_id).await.unwrap().unwrap();
    let error = thread.last_run_error.unwrap();
    assert_eq!(error.code.as_deref(), Some("timeout"));
    let run = lifecycle.store().get_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.error_code.as_deref(), Some("timeout"));
    assert_eq!(run.error_message.as_deref(), Some("model timed out"));
}

#[tokio::test]
async fn test_advance_after_completion_is_refused() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let run_id = start(&lifecycle, &thread_id, StartRunInput::new()).await;
    lifecycle
        .complete_run(&thread_id, &run_id, RunOutcome::success())
        .await
        .unwrap();

    let err = lifecycle.advance(&run_id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::RunCompleted(_)));
}

#[tokio::test]
async fn test_invalid_previous_run_releases_lock() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;

    let result = lifecycle
        .start_run(&thread_id, StartRunInput::continuing("R_nonexistent"))
        .await
        .unwrap();
    assert_eq!(result, StartRunResult::Rejected(RunRejection::InvalidPreviousRun));

    let thread = lifecycle.store().get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.run_status, RunStatus::Idle);
    assert!(thread.last_completed_run_id.is_none());

    start(&lifecycle, &thread_id, StartRunInput::new()).await;
}

#[tokio::test]
async fn test_previous_run_must_belong_to_thread() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let other = lifecycle
        .store()
        .create_thread(NewThread::new("user-1"))
        .await
        .unwrap();
    let foreign = start(&lifecycle, &other.id, StartRunInput::new()).await;
    lifecycle
        .complete_run(&other.id, &foreign, RunOutcome::success())
        .await
        .unwrap();

    let result = lifecycle
        .start_run(&thread_id, StartRunInput::continuing(foreign))
        .await
        .unwrap();
    assert_eq!(result, StartRunResult::Rejected(RunRejection::InvalidPreviousRun));
}

#[tokio::test]
async fn test_continuation_links_previous_run() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let first = start(&lifecycle, &thread_id, StartRunInput::new()).await;
    lifecycle
        .complete_run(&thread_id, &first, RunOutcome::success())
        .await
        .unwrap();

    let second = start(&lifecycle, &thread_id, StartRunInput::continuing(first.clone())).await;
    let run = lifecycle.store().get_run(&second).await.unwrap().unwrap();
    assert_eq!(run.previous_run_id.as_deref(), Some(first.as_str()));
}

#[tokio::test]
async fn test_open_previous_run_policy() {
    let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    // A run row that never reached a terminal state
    let open = store
        .create_run(NewRun {
            thread_id: thread.id.clone(),
            ..NewRun::default()
        })
        .await
        .unwrap();

    let strict = RunLifecycle::new(store.clone());
    let result = strict
        .start_run(&thread.id, StartRunInput::continuing(open.id.clone()))
        .await
        .unwrap();
    assert_eq!(result, StartRunResult::Rejected(RunRejection::InvalidPreviousRun));

    let lenient = RunLifecycleBuilder::new()
        .store(store)
        .require_terminal_previous_run(false)
        .build()
        .unwrap();
    let result = lenient
        .start_run(&thread.id, StartRunInput::continuing(open.id))
        .await
        .unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn test_has_messages_reflects_thread() {
    let (lifecycle, thread_id) = lifecycle_with_thread().await;
    let first = lifecycle
        .start_run(&thread_id, StartRunInput::new())
        .await
        .unwrap();
    assert!(!first.started().unwrap().has_messages);
    lifecycle
        .complete_run(&thread_id, first.run_id().unwrap(), RunOutcome::success())
        .await
        .unwrap();

    lifecycle.store().record_message(&thread_id).await.unwrap();
    let second = lifecycle
        .start_run(&thread_id, StartRunInput::new())
        .await
        .unwrap();
    assert!(second.started().unwrap().has_messages);
}

#[tokio::test]
async fn test_failed_run_creation_releases_lock() {
    let store = FailingStore::new();
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let lifecycle = RunLifecycle::new(store.clone());

    FailingStore::set(&store.fail_create_run, true);
    let err = lifecycle
        .start_run(&thread.id, StartRunInput::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::RunCreation { .. }));

    let after = store.get_thread(&thread.id).await.unwrap().unwrap();
    assert_eq!(after.run_status, RunStatus::Idle);
    assert!(after.current_run_id.is_none());

    FailingStore::set(&store.fail_create_run, false);
    start(&lifecycle, &thread.id, StartRunInput::new()).await;
}

#[tokio::test]
async fn test_failed_compensation_reports_stuck_thread() {
    let store = FailingStore::new();
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let lifecycle = RunLifecycle::new(store.clone());

    FailingStore::set(&store.fail_create_run, true);
    FailingStore::set(&store.fail_release, true);
    let err = lifecycle
        .start_run(&thread.id, StartRunInput::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::StuckThread { .. }));

    let after = store.get_thread(&thread.id).await.unwrap().unwrap();
    assert_eq!(after.run_status, RunStatus::Waiting);
    assert!(after.current_run_id.is_none());
}

#[tokio::test]
async fn test_failed_link_releases_lock_and_closes_run() {
    let store = FailingStore::new();
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let lifecycle = RunLifecycle::new(store.clone());

    FailingStore::set(&store.fail_link, true);
    let err = lifecycle
        .start_run(&thread.id, StartRunInput::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Store(_)));

    let after = store.get_thread(&thread.id).await.unwrap().unwrap();
    assert_eq!(after.run_status, RunStatus::Idle);

    let runs = store.list_runs(&thread.id, None).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].is_terminal());
    assert_eq!(runs[0].error_code.as_deref(), Some("link_failed"));
    assert_eq!(lifecycle.active_runs(), 0);
}

#[tokio::test]
async fn test_completion_attempts_both_writes() {
    let store = FailingStore::new();
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let lifecycle = RunLifecycle::new(store.clone());
    let run_id = start(&lifecycle, &thread.id, StartRunInput::new()).await;

    FailingStore::set(&store.fail_complete_run, true);
    let err = lifecycle
        .complete_run(&thread.id, &run_id, RunOutcome::success())
        .await
        .unwrap_err();
    match err {
        LifecycleError::Completion { thread: t, run, .. } => {
            assert!(t.is_none());
            assert!(run.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }

    // The thread-side release still landed
    let after = store.get_thread(&thread.id).await.unwrap().unwrap();
    assert_eq!(after.run_status, RunStatus::Idle);
    let run = store.get_run(&run_id).await.unwrap().unwrap();
    assert!(!run.is_terminal());
}

#[tokio::test]
async fn test_completion_failure_keeps_token_for_retry() {
    let store = FailingStore::new();
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let lifecycle = RunLifecycle::new(store.clone());
    let run_id = start(&lifecycle, &thread.id, StartRunInput::new()).await;

    FailingStore::set(&store.fail_release, true);
    FailingStore::set(&store.fail_complete_run, true);
    let err = lifecycle
        .complete_run(&thread.id, &run_id, RunOutcome::success())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Completion { thread: Some(_), run: Some(_), .. }
    ));

    let token = lifecycle.cancellation_token(&run_id).expect("token kept");
    assert!(!token.is_cancelled());

    FailingStore::set(&store.fail_release, false);
    FailingStore::set(&store.fail_complete_run, false);
    let report = lifecycle.cancel_run(&thread.id, &run_id).await.unwrap();
    assert!(report.lock_released && report.run_updated);
    assert!(token.is_cancelled());
    assert!(lifecycle.cancellation_token(&run_id).is_none());
}

#[tokio::test]
async fn test_completion_on_wrong_thread_is_refused() {
    let store: Arc<dyn RunStore> = Arc::new(MemoryStore::new());
    let owner = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let other = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let lifecycle = RunLifecycle::new(store.clone());
    let run_id = start(&lifecycle, &owner.id, StartRunInput::new()).await;

    let err = lifecycle.cancel_run(&other.id, &run_id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::ThreadMismatch { .. }));
    let err = lifecycle
        .complete_run(&other.id, &run_id, RunOutcome::success())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::ThreadMismatch { .. }));

    let err = lifecycle
        .complete_run(&owner.id, "R_missing", RunOutcome::success())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::RunNotFound(_)));

    // Nothing on the owning thread moved and the token never fired
    let token = lifecycle.cancellation_token(&run_id).unwrap();
    assert!(!token.is_cancelled());
    let after = store.get_thread(&owner.id).await.unwrap().unwrap();
    assert_eq!(after.run_status, RunStatus::Waiting);
    assert_eq!(after.current_run_id.as_deref(), Some(run_id.as_str()));
    assert!(!store.get_run(&run_id).await.unwrap().unwrap().is_terminal());
}

async fn linked_run(store: &FailingStore, thread_id: &str) -> String {
    for _ in 0..100 {
        let thread = store.get_thread(thread_id).await.unwrap().unwrap();
        if let Some(run_id) = thread.current_run_id {
            return run_id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no run was linked to thread {thread_id}");
}

#[tokio::test]
async fn test_start_finishes_after_caller_gives_up() {
    let store = FailingStore::new();
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let lifecycle = RunLifecycle::new(store.clone());

    FailingStore::set(&store.slow_create_run, true);
    let gave_up = tokio::time::timeout(
        Duration::from_millis(50),
        lifecycle.start_run(&thread.id, StartRunInput::new()),
    )
    .await;
    assert!(gave_up.is_err());
    FailingStore::set(&store.slow_create_run, false);

    // The start kept going: the lock is held by a real, visible run
    let run_id = linked_run(&store, &thread.id).await;
    for _ in 0..100 {
        if lifecycle.cancellation_token(&run_id).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(lifecycle.cancellation_token(&run_id).is_some());

    let busy = lifecycle
        .start_run(&thread.id, StartRunInput::new())
        .await
        .unwrap();
    assert_eq!(
        busy.rejection(),
        Some(&RunRejection::ConcurrentRun {
            current_run_id: Some(run_id.clone())
        })
    );

    let report = lifecycle.cancel_run(&thread.id, &run_id).await.unwrap();
    assert!(report.lock_released);
    start(&lifecycle, &thread.id, StartRunInput::new()).await;
}

#[tokio::test]
async fn test_completion_finishes_after_caller_gives_up() {
    let store = FailingStore::new();
    let thread = store.create_thread(NewThread::new("user-1")).await.unwrap();
    let lifecycle = RunLifecycle::new(store.clone());
    let run_id = start(&lifecycle, &thread.id, StartRunInput::new()).await;

    FailingStore::set(&store.slow_complete_run, true);
    let gave_up = tokio::time::timeout(
        Duration::from_millis(50),
        lifecycle.complete_run(&thread.id, &run_id, RunOutcome::success()),
    )
    .await;
    assert!(gave_up.is_err());

    for _ in 0..100 {
        if lifecycle.active_runs() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lifecycle.active_runs(), 0);

    let after = store.get_thread(&thread.id).await.unwrap().unwrap();
    assert_eq!(after.run_status, RunStatus::Idle);
    assert_eq!(after.last_completed_run_id.as_deref(), Some(run_id.as_str()));
    assert!(store.get_run(&run_id).await.unwrap().unwrap().is_terminal());
}
