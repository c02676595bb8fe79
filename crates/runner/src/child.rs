// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker child-process lifecycle: spawn with piped stdio, deliver
//! signals by process group, escalate SIGINT → SIGKILL on graceful stop.
//!
//! Stdin is handed back separately at spawn so the supervisor can keep
//! writing while a reaper task owns the child and awaits its exit.

use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Grace period between SIGINT and the follow-up SIGKILL on stop.
pub const STOP_GRACE: Duration = Duration::from_secs(2);

/// Wall-clock limit for prompt sub-processes.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub struct WorkerChild {
    child: Child,
    pid: Option<u32>,
}

impl WorkerChild {
    /// Spawn the worker with piped stdout/stderr in its own process
    /// group. Stdin is piped only when `interactive`; everyone else gets
    /// `/dev/null`.
    pub fn spawn(
        program: &str,
        argv: &[String],
        cwd: &std::path::Path,
        interactive: bool,
    ) -> anyhow::Result<(Self, Option<ChildStdin>, ChildStdout, ChildStderr)> {
        let mut cmd = Command::new(program);
        cmd.args(argv)
            .current_dir(cwd)
            .stdin(if interactive { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so signals do not leak to the runner itself.
        cmd.process_group(0);

        let mut child = cmd.spawn().with_context(|| format!("spawn worker: {program}"))?;
        let stdout = child.stdout.take().context("worker stdout missing")?;
        let stderr = child.stderr.take().context("worker stderr missing")?;
        let stdin = child.stdin.take();
        let pid = child.id();
        Ok((Self { child, pid }, stdin, stdout, stderr))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for exit; returns the exit code (or 128+signal when killed).
    pub async fn wait(&mut self) -> i32 {
        match self.child.wait().await {
            Ok(status) => exit_code_of(status),
            Err(_) => 1,
        }
    }
}

/// Deliver a signal to a child's process group.
pub fn send_signal(pid: u32, signal: Signal) -> anyhow::Result<()> {
    let pid = i32::try_from(pid).context("pid out of range")?;
    // Negative pid targets the group created at spawn.
    kill(Pid::from_raw(-pid), signal).context("deliver signal")?;
    Ok(())
}

/// Graceful stop: SIGINT now, SIGKILL after [`STOP_GRACE`] if the child
/// is still alive. The kill timer runs detached; the caller keeps
/// draining output until the child actually exits.
pub fn graceful_stop(pid: u32) -> anyhow::Result<()> {
    send_signal(pid, Signal::SIGINT)?;
    tokio::spawn(async move {
        tokio::time::sleep(STOP_GRACE).await;
        if is_alive(pid) {
            let _ = send_signal(pid, Signal::SIGKILL);
        }
    });
    Ok(())
}

/// Immediate SIGKILL of the process group.
pub fn hard_kill(pid: u32) {
    let _ = send_signal(pid, Signal::SIGKILL);
}

/// Whether a process is still alive (signal 0 probe).
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(pid), None).is_ok()
}

pub fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    status.code().unwrap_or(1)
}

#[cfg(test)]
#[path = "child_tests.rs"]
mod tests;
