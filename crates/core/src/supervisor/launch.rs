//! Child process launch.
//!
//! Spawns `<shell> -c <command line>` with:
//! - the write end of a fresh pipe installed as the status descriptor
//! - stdout and stderr redirected to files in a scoped temp directory
//! - its own process group, so a kill reaches every descendant

use crate::supervisor::error::{SupervisorError, SupervisorResult};
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::unistd::{dup2, pipe2, setpgid, Pid};
use paws_protocol::config_models::SupervisorConfig;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};

/// What to run and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessLaunch {
    /// Shell-invocable command line.
    pub command_line: String,

    /// Variables added to the inherited environment.
    pub env: Vec<(String, String)>,

    /// Label used in logs, e.g. `basecaller`.
    pub tool: Option<String>,

    pub working_dir: Option<PathBuf>,
}

impl ProcessLaunch {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            ..Self::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add `KEY=VALUE` assignments. Entries without `=` are skipped.
    pub fn with_env_assignments<I, S>(mut self, assignments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for assignment in assignments {
            match assignment.as_ref().split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    self.env.push((key.to_string(), value.to_string()));
                }
                _ => {
                    tracing::warn!(
                        assignment = assignment.as_ref(),
                        "skipping malformed environment assignment"
                    );
                }
            }
        }
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Label for logs, falling back to `shell`.
    pub fn tool_label(&self) -> &str {
        self.tool.as_deref().unwrap_or("shell")
    }
}

/// Scoped stdout/stderr capture files for one child.
///
/// The directory is removed when this value is dropped.
#[derive(Debug)]
pub struct OutputCapture {
    dir: TempDir,
}

impl OutputCapture {
    fn create() -> std::io::Result<(Self, File, File)> {
        let dir = tempfile::Builder::new()
            .prefix("paws-")
            .suffix(".tmpdir")
            .tempdir()?;
        let stdout = File::create(dir.path().join("stdout.txt"))?;
        let stderr = File::create(dir.path().join("stderr.txt"))?;
        Ok((Self { dir }, stdout, stderr))
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.dir.path().join("stdout.txt")
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.dir.path().join("stderr.txt")
    }

    /// Log the captured output at debug level, then delete the directory.
    pub async fn log_and_remove(self, tool: &str) {
        for (stream, path) in [("stdout", self.stdout_path()), ("stderr", self.stderr_path())] {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) if !content.is_empty() => {
                    tracing::debug!(tool, stream, "captured output:\n{content}");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(tool, stream, path = %path.display(), error = %e, "could not read captured output");
                }
            }
        }

        let dir = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(dir = %dir.display(), error = %e, "could not remove capture directory");
        }
    }
}

/// A freshly spawned child and the resources tied to it.
#[derive(Debug)]
pub struct SpawnedChild {
    pub child: Child,
    pub pid: Option<u32>,
    /// Read end of the status descriptor.
    pub status_channel: pipe::Receiver,
    pub capture: OutputCapture,
}

/// Spawn the child described by `launch`.
///
/// # Errors
///
/// - `SupervisorError::StatusChannel` if the pipe cannot be created
/// - `SupervisorError::Spawn` if the capture files or the process cannot
///   be created
///
/// Nothing is left open on failure.
pub fn spawn_child(launch: &ProcessLaunch, config: &SupervisorConfig) -> SupervisorResult<SpawnedChild> {
    let spawn_error = |source: std::io::Error| SupervisorError::Spawn {
        command: launch.command_line.clone(),
        source,
    };

    match which::which(&config.shell) {
        Ok(path) => tracing::debug!(shell = %path.display(), "resolved shell"),
        Err(e) => tracing::debug!(shell = %config.shell, error = %e, "shell not found on PATH"),
    }

    let (capture, stdout, stderr) = OutputCapture::create().map_err(spawn_error)?;

    // Both ends are close-on-exec; only the dup installed in the child
    // below survives exec.
    let (read_end, write_end) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| SupervisorError::StatusChannel(e.into()))?;

    let write_fd = write_end.as_raw_fd();
    let status_fd = config.status_fd;

    let mut cmd = Command::new(&config.shell);
    cmd.arg("-c")
        .arg(&launch.command_line)
        .envs(launch.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);
    if let Some(dir) = &launch.working_dir {
        cmd.current_dir(dir);
    }

    // SAFETY: the closure runs between fork and exec and only calls
    // async-signal-safe functions (setpgid, dup2, fcntl).
    unsafe {
        cmd.pre_exec(move || {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
            if write_fd == status_fd {
                fcntl(status_fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
            } else {
                dup2(write_fd, status_fd)?;
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(spawn_error)?;
    // The child holds its own copy; EOF on the read end now tracks the
    // child and its descendants.
    drop(write_end);

    let status_channel =
        pipe::Receiver::from_owned_fd(read_end).map_err(SupervisorError::StatusChannel)?;
    let pid = child.id();

    tracing::info!(
        tool = launch.tool_label(),
        pid = ?pid,
        command = %launch.command_line,
        "spawned child"
    );

    Ok(SpawnedChild {
        child,
        pid,
        status_channel,
        capture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_env_assignments() {
        let launch = ProcessLaunch::new("true")
            .with_env_assignments(["STATUS_COUNT=3", "broken", "=x", "EMPTY="])
            .with_env("EXIT_CODE", "0");
        assert_eq!(
            launch.env,
            vec![
                ("STATUS_COUNT".to_string(), "3".to_string()),
                ("EMPTY".to_string(), String::new()),
                ("EXIT_CODE".to_string(), "0".to_string()),
            ]
        );
        assert_eq!(launch.tool_label(), "shell");
        assert_eq!(launch.with_tool("ppa").tool_label(), "ppa");
    }

    #[tokio::test]
    async fn test_child_writes_to_status_descriptor() {
        let launch = ProcessLaunch::new("echo \"_STATUS {\\\"counter\\\":$N}\" >&3; echo out")
            .with_env("N", "5");
        let mut spawned = spawn_child(&launch, &SupervisorConfig::default()).unwrap();
        assert!(spawned.pid.is_some());

        let mut received = String::new();
        spawned
            .status_channel
            .read_to_string(&mut received)
            .await
            .unwrap();
        assert_eq!(received, "_STATUS {\"counter\":5}\n");

        let status = spawned.child.wait().await.unwrap();
        assert!(status.success());
        let stdout = std::fs::read_to_string(spawned.capture.stdout_path()).unwrap();
        assert_eq!(stdout, "out\n");

        let dir = spawned.capture.dir().to_path_buf();
        spawned.capture.log_and_remove("test").await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let config = SupervisorConfig {
            shell: "/nonexistent/paws-shell".to_string(),
            ..SupervisorConfig::default()
        };
        let err = spawn_child(&ProcessLaunch::new("true"), &config).unwrap_err();
        match err {
            SupervisorError::Spawn { command, source } => {
                assert_eq!(command, "true");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("Expected Spawn error, got {other:?}"),
        }
    }
}
