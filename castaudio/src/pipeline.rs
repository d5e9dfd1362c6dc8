//! Capture → transcode process pair feeding one HTTP response.
//!
//! The capture program writes raw PCM to its stdout, a pump task copies it
//! into the transcoder's stdin, and the transcoder's stdout is handed to the
//! response body. Each child is reaped by its own task. Dropping the
//! [`PipelineHandle`] kills both children.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a reaper waits for the remaining stderr once its child is gone.
const STDERR_GRACE: Duration = Duration::from_secs(1);
const STDERR_LIMIT: u64 = 64 * 1024;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} has no {pipe} pipe")]
    MissingPipe {
        program: String,
        pipe: &'static str,
    },
}

/// Program and arguments of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// A running capture/transcode pair. Owned by exactly one response body.
pub struct PipelineHandle {
    cancel: CancellationToken,
    output: Option<ChildStdout>,
    pids: (Option<u32>, Option<u32>),
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Starts both stages. Must be called within a tokio runtime.
    pub fn spawn(capture: &CommandSpec, transcode: &CommandSpec) -> Result<Self, PipelineError> {
        let mut capture_child = capture
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: capture.program.clone(),
                source,
            })?;

        let mut transcode_child = match transcode
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                let _ = capture_child.start_kill();
                return Err(PipelineError::Spawn {
                    program: transcode.program.clone(),
                    source,
                });
            }
        };

        let pids = (capture_child.id(), transcode_child.id());
        let cancel = CancellationToken::new();

        let pipes = (
            capture_child.stdout.take(),
            transcode_child.stdin.take(),
            transcode_child.stdout.take(),
        );
        let (Some(mut capture_out), Some(mut transcode_in), Some(output)) = pipes else {
            let _ = capture_child.start_kill();
            let _ = transcode_child.start_kill();
            return Err(PipelineError::MissingPipe {
                program: transcode.program.clone(),
                pipe: "stdio",
            });
        };

        let pump_cancel = cancel.clone();
        let pump = tokio::spawn(async move {
            tokio::select! {
                copied = tokio::io::copy(&mut capture_out, &mut transcode_in) => match copied {
                    Ok(bytes) => debug!(bytes, "capture stream ended"),
                    Err(e) => debug!("capture pump stopped: {}", e),
                },
                _ = pump_cancel.cancelled() => {}
            }
        });

        let tasks = vec![
            pump,
            reaper(capture.program.clone(), Stage::Capture, capture_child, &cancel),
            reaper(transcode.program.clone(), Stage::Transcode, transcode_child, &cancel),
        ];

        debug!(
            capture_pid = ?pids.0,
            transcode_pid = ?pids.1,
            "pipeline started: {} | {}",
            capture.program,
            transcode.program
        );

        Ok(Self {
            cancel,
            output: Some(output),
            pids,
            tasks,
        })
    }

    /// The transcoder's stdout. Yields `Some` once.
    pub fn take_output(&mut self) -> Option<ChildStdout> {
        self.output.take()
    }

    #[cfg(test)]
    fn pids(&self) -> (Option<u32>, Option<u32>) {
        self.pids
    }

    /// Kills both children. Safe to call any number of times.
    pub fn teardown(&self) {
        if !self.cancel.is_cancelled() {
            debug!(capture_pid = ?self.pids.0, transcode_pid = ?self.pids.1, "tearing down pipeline");
            self.cancel.cancel();
        }
    }

    /// Tears down and waits until both children have been reaped.
    pub async fn shutdown(mut self) {
        self.teardown();
        self.output.take();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Position of a child in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Capture,
    Transcode,
}

/// How a child ended, as far as logging is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitKind {
    Clean,
    /// Killed by teardown, or a capture whose reader went away.
    Stopped,
    Unexpected,
}

fn classify_exit(status: &ExitStatus, stage: Stage, torn_down: bool) -> ExitKind {
    if status.success() {
        ExitKind::Clean
    } else if torn_down || (stage == Stage::Capture && broken_pipe(status)) {
        ExitKind::Stopped
    } else {
        ExitKind::Unexpected
    }
}

#[cfg(unix)]
fn broken_pipe(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(libc::SIGPIPE)
}

#[cfg(not(unix))]
fn broken_pipe(_status: &ExitStatus) -> bool {
    false
}

fn reaper(
    program: String,
    stage: Stage,
    child: Child,
    cancel: &CancellationToken,
) -> JoinHandle<()> {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        reap(&program, stage, child, &cancel).await;
    })
}

async fn reap(
    program: &str,
    stage: Stage,
    mut child: Child,
    cancel: &CancellationToken,
) -> ExitKind {
    let stderr = child.stderr.take().map(|s| tokio::spawn(collect_stderr(s)));

    // A child that ended before teardown keeps its own exit status.
    let (status, torn_down) = tokio::select! {
        biased;
        status = child.wait() => (status, false),
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            (child.wait().await, true)
        }
    };

    let stderr = match stderr {
        Some(task) => match tokio::time::timeout(STDERR_GRACE, task).await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        },
        None => String::new(),
    };
    let stderr = stderr.trim();

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            warn!(%program, "failed to wait for process: {}", e);
            return ExitKind::Unexpected;
        }
    };

    let kind = classify_exit(&status, stage, torn_down);
    match kind {
        ExitKind::Clean => debug!(%program, "process exited"),
        ExitKind::Stopped => debug!(%program, %status, "process stopped"),
        ExitKind::Unexpected => warn!(%program, %status, "process exited unexpectedly"),
    }
    if !stderr.is_empty() {
        match kind {
            ExitKind::Unexpected => warn!(%program, "stderr: {}", stderr),
            _ => info!(%program, "stderr: {}", stderr),
        }
    }
    kind
}

async fn collect_stderr(stderr: ChildStderr) -> String {
    let mut buf = Vec::new();
    let _ = stderr.take(STDERR_LIMIT).read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn test_output_flows_through_both_stages() {
        let cat = CommandSpec::new("cat", Vec::<String>::new());
        let mut handle = PipelineHandle::spawn(&sh("printf 'hello pipeline'"), &cat).unwrap();
        let mut output = handle.take_output().unwrap();
        assert!(handle.take_output().is_none());

        let mut text = String::new();
        output.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "hello pipeline");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = PipelineHandle::spawn(
            &CommandSpec::new("audiocast-no-such-program", ["-x"]),
            &CommandSpec::new("cat", Vec::<String>::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PipelineError::Spawn { ref program, .. } if program == "audiocast-no-such-program"));
        assert!(err.to_string().starts_with("failed to start audiocast-no-such-program"));
    }

    #[tokio::test]
    async fn test_missing_transcoder() {
        let err = PipelineHandle::spawn(
            &CommandSpec::new("yes", Vec::<String>::new()),
            &CommandSpec::new("audiocast-no-such-transcoder", Vec::<String>::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PipelineError::Spawn { ref program, .. } if program == "audiocast-no-such-transcoder"));
    }

    #[tokio::test]
    async fn test_failing_stage_ends_output() {
        let mut handle = PipelineHandle::spawn(
            &CommandSpec::new("yes", Vec::<String>::new()),
            &sh("echo broken >&2; exit 3"),
        )
        .unwrap();
        let mut output = handle.take_output().unwrap();
        let mut buf = Vec::new();
        output.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let mut handle = PipelineHandle::spawn(
            &CommandSpec::new("yes", Vec::<String>::new()),
            &CommandSpec::new("cat", Vec::<String>::new()),
        )
        .unwrap();
        let (capture, transcode) = handle.pids();
        assert!(capture.is_some() && transcode.is_some());

        let mut output = handle.take_output().unwrap();
        let mut buf = [0u8; 64];
        let n = output.read(&mut buf).await.unwrap();
        assert!(n > 0);

        handle.teardown();
        handle.teardown();
        assert!(handle.cancel.is_cancelled());

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }

    #[cfg(unix)]
    fn status(raw: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(raw)
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_exit() {
        let ok = status(0);
        let failed = status(3 << 8);
        let sigkill = status(libc::SIGKILL);
        let sigpipe = status(libc::SIGPIPE);

        assert_eq!(classify_exit(&ok, Stage::Transcode, false), ExitKind::Clean);
        assert_eq!(classify_exit(&failed, Stage::Capture, false), ExitKind::Unexpected);
        assert_eq!(classify_exit(&failed, Stage::Capture, true), ExitKind::Stopped);

        // Only teardown makes a SIGKILL expected.
        assert_eq!(classify_exit(&sigkill, Stage::Transcode, false), ExitKind::Unexpected);
        assert_eq!(classify_exit(&sigkill, Stage::Capture, false), ExitKind::Unexpected);
        assert_eq!(classify_exit(&sigkill, Stage::Transcode, true), ExitKind::Stopped);

        // A capture loses its reader when the transcoder goes away.
        assert_eq!(classify_exit(&sigpipe, Stage::Capture, false), ExitKind::Stopped);
        assert_eq!(classify_exit(&sigpipe, Stage::Transcode, false), ExitKind::Unexpected);
    }

    fn spawn_child(script: &str) -> Child {
        sh(script)
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_self_kill_is_unexpected() {
        let cancel = CancellationToken::new();
        let child = spawn_child("echo boom >&2; kill -9 $$");
        let kind = reap("sh", Stage::Capture, child, &cancel).await;
        assert_eq!(kind, ExitKind::Unexpected);
    }

    #[tokio::test]
    async fn test_teardown_kill_is_stopped() {
        let cancel = CancellationToken::new();
        let child = spawn_child("exec sleep 30");
        cancel.cancel();
        let kind = tokio::time::timeout(
            Duration::from_secs(5),
            reap("sleep", Stage::Transcode, child, &cancel),
        )
        .await
        .unwrap();
        assert_eq!(kind, ExitKind::Stopped);
    }

    #[tokio::test]
    async fn test_clean_exit_with_stderr() {
        let cancel = CancellationToken::new();
        let child = spawn_child("echo note >&2; exit 0");
        let kind = reap("sh", Stage::Transcode, child, &cancel).await;
        assert_eq!(kind, ExitKind::Clean);
    }
}
