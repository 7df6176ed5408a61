//! Test fixtures for launching the dummy instrument tool.

use paws_core::state::StatusRecord;
use paws_core::supervisor::{ProcessLaunch, Supervisor};
use paws_protocol::config_models::SupervisorConfig;
use std::sync::Arc;

/// Absolute path of the bash fixture.
pub fn dummy_script() -> String {
    format!("{}/tests/testdata/dummy-basic.sh", env!("CARGO_MANIFEST_DIR"))
}

/// Launch of `dummy-basic.sh` writing status to descriptor 3.
///
/// `env` holds `KEY=VALUE` assignments for the script.
pub fn dummy_launch(env: &[&str]) -> ProcessLaunch {
    ProcessLaunch::new(format!("bash '{}' --status-fd 3", dummy_script()))
        .with_env_assignments(env.iter().copied())
        .with_tool("dummy")
}

/// Supervisor with the given steady-state deadline.
pub fn supervisor_with_deadline(deadline_secs: f64) -> Supervisor {
    Supervisor::new(SupervisorConfig {
        default_deadline_secs: deadline_secs,
        ..SupervisorConfig::default()
    })
}

#[allow(dead_code)]
pub fn new_record() -> Arc<StatusRecord> {
    Arc::new(StatusRecord::new())
}

/// Install a test subscriber once so `RUST_LOG` works with `--nocapture`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
