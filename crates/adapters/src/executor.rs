// SPDX-License-Identifier: MIT

//! Supervises a single `vmchecker-vm-executor` run and records its result.
//!
//! Spawns the external `vmchecker-vm-executor` child process and waits for
//! it with a deadline rather than a wall-clock polling loop. On timeout it
//! escalates SIGINT, a grace period, then SIGTERM so the executor can run
//! its own VM-handle cleanup. Every control path writes `grade.vmr` and
//! `vmchecker-stderr.vmr` exactly once and never propagates an error to its
//! caller.

use std::path::Path;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::{sleep, sleep_until, Instant};

const EXECUTOR_BIN: &str = "vmchecker-vm-executor";

/// Grace period between SIGINT and SIGTERM on timeout.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

const GRADE_FILE: &str = "grade.vmr";
const STDERR_FILE: &str = "vmchecker-stderr.vmr";

/// How the executor run concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorOutcome {
    Success,
    Failure,
    Timeout,
    SpawnFailed,
}

pub struct ExecutorSupervisor;

impl ExecutorSupervisor {
    /// Run `vmchecker-vm-executor <unpack_dir>` under `timeout`. Never
    /// throws: every branch writes the result artifacts and returns.
    pub async fn run(unpack_dir: &Path, timeout: Duration) -> ExecutorOutcome {
        let mut child = match Command::new(EXECUTOR_BIN).arg(unpack_dir).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(dir = %unpack_dir.display(), error = %e, "failed to spawn vmchecker-vm-executor");
                append_stderr(unpack_dir, "Cannot run vmchecker-vm-executor").await;
                append_stderr(unpack_dir, "Please contact the administrators.").await;
                write_grade(unpack_dir, false).await;
                return ExecutorOutcome::SpawnFailed;
            }
        };

        let deadline = Instant::now() + timeout;

        tokio::select! {
            wait_result = child.wait() => Self::finish(unpack_dir, wait_result).await,
            _ = sleep_until(deadline) => {
                append_stderr(
                    unpack_dir,
                    "vmchecker: the task is taking too long, aborting execution",
                )
                .await;
                write_grade(unpack_dir, false).await;
                kill_gracefully(&mut child).await;
                ExecutorOutcome::Timeout
            }
        }
    }

    async fn finish(
        unpack_dir: &Path,
        wait_result: std::io::Result<std::process::ExitStatus>,
    ) -> ExecutorOutcome {
        match wait_result {
            Ok(status) => {
                let success = status.success();
                let code = status.code().unwrap_or(-1);
                append_stderr(
                    unpack_dir,
                    &format!(
                        "vmexecutor exitcode {} ({})",
                        code,
                        if success { "success" } else { "error" }
                    ),
                )
                .await;
                write_grade(unpack_dir, success).await;
                if success {
                    ExecutorOutcome::Success
                } else {
                    ExecutorOutcome::Failure
                }
            }
            Err(e) => {
                tracing::warn!(dir = %unpack_dir.display(), error = %e, "failed to wait on vmchecker-vm-executor");
                append_stderr(unpack_dir, "vmexecutor exitcode -1 (error)").await;
                write_grade(unpack_dir, false).await;
                ExecutorOutcome::Failure
            }
        }
    }
}

/// Send INT, wait up to [`GRACE_PERIOD`] for the child to exit on its own,
/// then escalate to TERM. Both signal sends are best-effort.
async fn kill_gracefully(child: &mut Child) {
    let Some(pid) = child.id() else {
        // Already reaped between timeout firing and us getting here.
        return;
    };
    let pid = Pid::from_raw(pid as i32);

    if let Err(e) = signal::kill(pid, Signal::SIGINT) {
        tracing::warn!(pid = pid.as_raw(), error = %e, "failed to send SIGINT to executor");
    }

    tokio::select! {
        _ = child.wait() => return,
        _ = sleep(GRACE_PERIOD) => {}
    }

    if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
        tracing::warn!(pid = pid.as_raw(), error = %e, "failed to send SIGTERM to executor");
    }
    let _ = child.wait().await;
}

/// Overwrite `grade.vmr` with the single status word.
async fn write_grade(unpack_dir: &Path, success: bool) {
    let contents = if success { "done" } else { "error" };
    if let Err(e) = tokio::fs::write(unpack_dir.join(GRADE_FILE), contents).await {
        tracing::error!(dir = %unpack_dir.display(), error = %e, "failed to write grade.vmr");
    }
}

/// Append one line to `vmchecker-stderr.vmr`, creating it on first write.
async fn append_stderr(unpack_dir: &Path, message: &str) {
    use tokio::io::AsyncWriteExt;
    let path = unpack_dir.join(STDERR_FILE);
    match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(mut file) => {
            if let Err(e) = file.write_all(format!("{message}\n").as_bytes()).await {
                tracing::error!(dir = %unpack_dir.display(), error = %e, "failed to append to vmchecker-stderr.vmr");
            }
        }
        Err(e) => {
            tracing::error!(dir = %unpack_dir.display(), error = %e, "failed to open vmchecker-stderr.vmr");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// Run a supervisor test against a fake executor script by putting it
    /// first on PATH under the fixed binary name.
    async fn run_with_fake_executor(script_body: &str, timeout: StdDuration) -> (ExecutorOutcome, std::path::PathBuf) {
        let bin_dir = tempfile::tempdir().unwrap();
        script(bin_dir.path(), EXECUTOR_BIN, script_body);
        let unpack_dir = tempfile::tempdir().unwrap();

        let old_path = std::env::var("PATH").unwrap_or_default();
        let new_path = format!("{}:{}", bin_dir.path().display(), old_path);
        std::env::set_var("PATH", new_path);
        let outcome = ExecutorSupervisor::run(unpack_dir.path(), timeout).await;
        std::env::set_var("PATH", old_path);

        (outcome, unpack_dir.into_path())
    }

    #[tokio::test]
    async fn successful_exit_writes_done_grade() {
        let (outcome, dir) =
            run_with_fake_executor("#!/bin/sh\nexit 0\n", StdDuration::from_secs(5)).await;
        assert_eq!(outcome, ExecutorOutcome::Success);
        let grade = std::fs::read_to_string(dir.join(GRADE_FILE)).unwrap();
        assert_eq!(grade, "done");
        let stderr = std::fs::read_to_string(dir.join(STDERR_FILE)).unwrap();
        assert!(stderr.contains("exitcode 0 (success)"));
    }

    #[tokio::test]
    async fn nonzero_exit_writes_error_grade() {
        let (outcome, dir) =
            run_with_fake_executor("#!/bin/sh\nexit 7\n", StdDuration::from_secs(5)).await;
        assert_eq!(outcome, ExecutorOutcome::Failure);
        let grade = std::fs::read_to_string(dir.join(GRADE_FILE)).unwrap();
        assert_eq!(grade, "error");
        let stderr = std::fs::read_to_string(dir.join(STDERR_FILE)).unwrap();
        assert!(stderr.contains("exitcode 7 (error)"));
    }

    #[tokio::test]
    async fn spawn_failure_writes_contact_administrators_message() {
        let unpack_dir = tempfile::tempdir().unwrap();
        let old_path = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", "/nonexistent");
        let outcome = ExecutorSupervisor::run(unpack_dir.path(), StdDuration::from_secs(5)).await;
        std::env::set_var("PATH", old_path);

        assert_eq!(outcome, ExecutorOutcome::SpawnFailed);
        let grade = std::fs::read_to_string(unpack_dir.path().join(GRADE_FILE)).unwrap();
        assert_eq!(grade, "error");
        let stderr = std::fs::read_to_string(unpack_dir.path().join(STDERR_FILE)).unwrap();
        assert!(stderr.contains("Cannot run vmchecker-vm-executor"));
        assert!(stderr.contains("contact the administrators"));
    }

    #[tokio::test]
    async fn timeout_kills_child_and_writes_error_grade() {
        let (outcome, dir) =
            run_with_fake_executor("#!/bin/sh\nsleep 30\n", StdDuration::from_millis(200)).await;
        assert_eq!(outcome, ExecutorOutcome::Timeout);
        let grade = std::fs::read_to_string(dir.join(GRADE_FILE)).unwrap();
        assert_eq!(grade, "error");
        let stderr = std::fs::read_to_string(dir.join(STDERR_FILE)).unwrap();
        assert!(stderr.contains("taking too long"));
    }
}
