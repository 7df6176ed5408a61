//! Integration tests for supervising real child processes.

mod common;

use common::*;
use paws_core::state::RecordError;
use paws_core::supervisor::{
    ProcessLaunch, SupervisionState, Supervisor, SupervisorError, TerminationReason,
};
use paws_protocol::config_models::SupervisorConfig;
use paws_protocol::process_models::{CompletionStatus, ExecutionStatus, TIMEOUT_EXIT_CODE};
use paws_protocol::status_models::ReportState;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_watch_succeeds() {
    init_tracing();
    let record = new_record();
    let handle = supervisor_with_deadline(2.0)
        .start(
            dummy_launch(&["STATUS_COUNT=3", "STATUS_DELAY_SECONDS=0.05"]),
            record.clone(),
        )
        .await
        .expect("Failed to start dummy script");

    assert!(record.is_armed().await);
    assert!(handle.pid().is_some());

    let started = Instant::now();
    let outcome = handle.wait().await.expect("Supervision should finish");
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.reason, TerminationReason::Exited);
    assert_eq!(handle.state(), SupervisionState::Completed);

    let status = record.snapshot().await;
    assert!(!status.armed);
    assert_eq!(status.exit_code, Some(0));
    assert_eq!(status.execution_status, ExecutionStatus::Complete);
    assert_eq!(status.completion_status, CompletionStatus::Success);
    assert_eq!(status.progress.counter, 3);
    assert_eq!(status.progress.counter_max, 3);
    assert!((status.progress.net_progress - 1.0).abs() < 1e-9);
    assert!(status.time_stamp.unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_watch_kills_on_short_deadline() {
    let record = new_record();
    let handle = supervisor_with_deadline(0.001)
        .start(
            dummy_launch(&["STATUS_COUNT=3", "STATUS_DELAY_SECONDS=0.05"]),
            record.clone(),
        )
        .await
        .expect("Failed to start dummy script");

    let outcome = handle.wait().await.expect("Supervision should finish");

    assert_eq!(outcome.exit_code, TIMEOUT_EXIT_CODE);
    assert_eq!(outcome.reason, TerminationReason::TimedOut);
    assert_eq!(handle.state(), SupervisionState::Killed);

    let status = record.snapshot().await;
    assert!(!status.armed);
    assert_eq!(status.exit_code, Some(TIMEOUT_EXIT_CODE));
    assert_eq!(status.completion_status, CompletionStatus::Aborted);
}

#[tokio::test]
async fn test_child_timeout_extends_deadline() {
    // Lines are 0.3s apart; the default deadline alone would kill it.
    let record = new_record();
    let handle = supervisor_with_deadline(0.1)
        .start_controlled(
            dummy_launch(&[
                "STATUS_COUNT=3",
                "STATUS_DELAY_SECONDS=0.3",
                "STATUS_TIMEOUT_SECONDS=5",
            ]),
            record.clone(),
            Duration::from_secs(5),
        )
        .await
        .expect("Failed to start dummy script");

    let outcome = handle.wait().await.expect("Supervision should finish");

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(record.snapshot().await.timeout_for_next_status, Some(5.0));
}

#[tokio::test]
async fn test_noise_keeps_child_requested_deadline() {
    for middle in [
        "echo 'loading model...' >&3",
        "echo '_STATUS {\"counter\": \"x\"}' >&3",
        "echo '_STATUS {\"state\": \"exception\", \"message\": \"retrying\"}' >&3",
    ] {
        let record = new_record();
        let handle = supervisor_with_deadline(0.2)
            .start_controlled(
                ProcessLaunch::new(format!(
                    "echo '_STATUS {{\"timeoutForNextStatus\": 5}}' >&3; {middle}; \
                     sleep 1; echo '_STATUS {{\"counter\": 1}}' >&3"
                )),
                record.clone(),
                Duration::from_secs(5),
            )
            .await
            .expect("Failed to start");

        let outcome = handle.wait().await.expect("Supervision should finish");
        assert_eq!(outcome.exit_code, 0, "{middle}");
        assert_eq!(outcome.reason, TerminationReason::Exited);
        assert_eq!(record.snapshot().await.progress.counter, 1);
    }
}

#[tokio::test]
async fn test_stall_allows_slow_start() {
    let record = new_record();
    let handle = supervisor_with_deadline(0.2)
        .start_controlled(
            ProcessLaunch::new("sleep 0.5; echo '_STATUS {\"counter\": 1}' >&3"),
            record.clone(),
            Duration::from_secs(5),
        )
        .await
        .expect("Failed to start");

    let outcome = handle.wait().await.expect("Supervision should finish");
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(record.snapshot().await.progress.counter, 1);
}

#[tokio::test]
async fn test_without_stall_slow_start_is_killed() {
    let record = new_record();
    let handle = supervisor_with_deadline(0.2)
        .start(
            ProcessLaunch::new("sleep 5; echo '_STATUS {}' >&3"),
            record.clone(),
        )
        .await
        .expect("Failed to start");

    let started = Instant::now();
    let outcome = handle.wait().await.expect("Supervision should finish");
    assert_eq!(outcome.exit_code, TIMEOUT_EXIT_CODE);
    // The whole group is killed, so nobody waits for the sleep.
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_stop_uses_kill_path() {
    let record = new_record();
    let handle = supervisor_with_deadline(30.0)
        .start(
            dummy_launch(&["STATUS_COUNT=1000", "STATUS_DELAY_SECONDS=0.05"]),
            record.clone(),
        )
        .await
        .expect("Failed to start dummy script");

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stop().expect("Stop should be accepted");
    handle.stop().expect("Repeated stop should be accepted");

    let outcome = handle.wait().await.expect("Supervision should finish");
    assert_eq!(outcome.exit_code, TIMEOUT_EXIT_CODE);
    assert_eq!(outcome.reason, TerminationReason::Stopped);
    assert_eq!(record.exit_code().await, Some(TIMEOUT_EXIT_CODE));

    assert!(matches!(
        handle.stop(),
        Err(SupervisorError::AlreadyFinished)
    ));
}

#[tokio::test]
async fn test_stop_after_status_channel_closed() {
    let record = new_record();
    let handle = Supervisor::default()
        .start(ProcessLaunch::new("exec 3>&-; sleep 30"), record.clone())
        .await
        .expect("Failed to start");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(record.is_armed().await);
    handle.stop().expect("Stop should be accepted");

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("Stop should not wait for the sleep")
        .expect("Supervision should finish");
    assert_eq!(outcome.exit_code, TIMEOUT_EXIT_CODE);
    assert_eq!(outcome.reason, TerminationReason::Stopped);
}

#[tokio::test]
async fn test_exception_is_surfaced() {
    let record = new_record();
    let handle = supervisor_with_deadline(2.0)
        .start(
            dummy_launch(&[
                "STATUS_COUNT=1",
                "STATUS_DELAY_SECONDS=0.01",
                "STATUS_EXCEPTION=HELLO",
                "EXIT_CODE=1",
            ]),
            record.clone(),
        )
        .await
        .expect("Failed to start dummy script");

    let outcome = handle.wait().await.expect("Supervision should finish");
    assert_eq!(outcome.exit_code, 1);

    let status = record.snapshot().await;
    assert_eq!(status.state, ReportState::Exception);
    assert_eq!(status.message.as_deref(), Some("HELLO"));
    assert_eq!(status.completion_status, CompletionStatus::Failed);
    assert_eq!(status.progress.counter, 1);
}

#[tokio::test]
async fn test_nonzero_exit_is_failed() {
    let record = new_record();
    let handle = Supervisor::default()
        .start(ProcessLaunch::new("exit 7"), record.clone())
        .await
        .expect("Failed to start");

    let outcome = handle.wait().await.expect("Supervision should finish");
    assert_eq!(outcome.exit_code, 7);
    assert_eq!(
        record.snapshot().await.completion_status,
        CompletionStatus::Failed
    );
}

#[tokio::test]
async fn test_malformed_lines_do_not_stop_supervision() {
    let record = new_record();
    let handle = Supervisor::default()
        .start(
            ProcessLaunch::new(
                "echo 'hello' >&3; echo '_STATUS {\"counter\": \"x\"}' >&3; echo '_STATUS {\"counter\": 2}' >&3",
            ),
            record.clone(),
        )
        .await
        .expect("Failed to start");

    let outcome = handle.wait().await.expect("Supervision should finish");
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(record.snapshot().await.progress.counter, 2);
}

#[tokio::test]
async fn test_environment_and_working_dir() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let record = new_record();
    let handle = Supervisor::default()
        .start(
            ProcessLaunch::new("test \"$(pwd -P)\" = \"$EXPECTED_DIR\" && exit $CODE")
                .with_env("CODE", "5")
                .with_env(
                    "EXPECTED_DIR",
                    dir.path().canonicalize().unwrap().to_str().unwrap(),
                )
                .with_working_dir(dir.path()),
            record.clone(),
        )
        .await
        .expect("Failed to start");

    assert_eq!(handle.wait().await.unwrap().exit_code, 5);
}

#[tokio::test]
async fn test_spawn_failure_leaves_record_untouched() {
    let supervisor = Supervisor::new(SupervisorConfig {
        shell: "/nonexistent/paws-shell".to_string(),
        ..SupervisorConfig::default()
    });
    let record = new_record();

    let result = supervisor
        .start(ProcessLaunch::new("true"), record.clone())
        .await;

    assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
    let status = record.snapshot().await;
    assert!(!status.armed);
    assert_eq!(status.execution_status, ExecutionStatus::Ready);

    // The record can still be used for a real start.
    let handle = Supervisor::default()
        .start(ProcessLaunch::new("true"), record.clone())
        .await
        .expect("Record should be reusable after a failed spawn");
    assert_eq!(handle.wait().await.unwrap().exit_code, 0);
}

#[tokio::test]
async fn test_record_cannot_be_shared() {
    let record = new_record();
    let supervisor = Supervisor::default();
    let handle = supervisor
        .start(ProcessLaunch::new("sleep 0.3"), record.clone())
        .await
        .expect("Failed to start");

    let second = supervisor
        .start(ProcessLaunch::new("true"), record.clone())
        .await;
    assert!(matches!(
        second,
        Err(SupervisorError::Record(RecordError::AlreadyArmed))
    ));

    handle.wait().await.unwrap();
    let third = supervisor
        .start(ProcessLaunch::new("true"), record.clone())
        .await;
    assert!(matches!(
        third,
        Err(SupervisorError::Record(RecordError::AlreadyFinalized))
    ));
}

#[tokio::test]
async fn test_abandoned_wait_does_not_cancel_supervision() {
    let record = new_record();
    let handle = Supervisor::default()
        .start(ProcessLaunch::new("sleep 0.3"), record.clone())
        .await
        .expect("Failed to start");

    let abandoned = tokio::time::timeout(Duration::from_millis(10), handle.wait()).await;
    assert!(abandoned.is_err());

    let outcome = handle.wait().await.expect("Supervision should finish");
    assert_eq!(outcome.exit_code, 0);
    assert!(!record.is_armed().await);
}

#[tokio::test]
async fn test_finalize_once_under_jittered_races() {
    // Deadlines straddle the 0.05s line spacing so some trials exit
    // normally and some are killed.
    for trial in 0..20u32 {
        let deadline = 0.03 + f64::from(trial % 6) * 0.01;
        let record = new_record();
        let handle = supervisor_with_deadline(deadline)
            .start_controlled(
                dummy_launch(&["STATUS_COUNT=2", "STATUS_DELAY_SECONDS=0.05"]),
                record.clone(),
                Duration::from_secs(1),
            )
            .await
            .expect("Failed to start dummy script");

        let outcome = handle.wait().await.expect("Supervision should finish");
        assert!(
            outcome.exit_code == 0 || outcome.exit_code == TIMEOUT_EXIT_CODE,
            "trial {trial}: unexpected exit code {}",
            outcome.exit_code
        );
        assert_eq!(record.exit_code().await, Some(outcome.exit_code));
        assert!(!record.is_armed().await);

        // The supervisor already finalized; a second attempt is refused and
        // does not change the result.
        assert_eq!(record.finalize(42).await, Err(RecordError::AlreadyFinalized));
        assert_eq!(record.exit_code().await, Some(outcome.exit_code));
    }
}
