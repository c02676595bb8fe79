// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Allowlisted command execution in a subshell.
//!
//! Commands run via `sh -c` with the sandbox cwd, a wall-clock timeout,
//! and a hard output cap. `cd`/`pwd`/listing commands are special-cased
//! by the supervisor before reaching [`run_command`].

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncReadExt;

/// Wall-clock limit for injected commands.
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Combined stdout+stderr cap.
pub const OUTPUT_CAP: usize = 10 * 1024 * 1024;

/// How the supervisor should treat an injected literal command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandShape {
    /// `cd <path>` — sandbox-checked directory change, no subshell.
    ChangeDir(String),
    /// `pwd` — answered from the sandbox, no subshell.
    PrintDir,
    /// `ls`/`dir`/`ll` — run, but prefix the reply with the sandbox-relative cwd.
    Listing,
    /// `git diff` — run, and also persist/upload the output as an artifact.
    GitDiff,
    /// Anything else allowlisted.
    Plain,
}

pub fn classify(command: &str) -> CommandShape {
    let trimmed = command.trim();
    if let Some(rest) = trimmed.strip_prefix("cd ") {
        return CommandShape::ChangeDir(rest.trim().to_owned());
    }
    if trimmed == "cd" {
        return CommandShape::ChangeDir("".to_owned());
    }
    if trimmed == "pwd" {
        return CommandShape::PrintDir;
    }
    let head = trimmed.split_whitespace().next().unwrap_or("");
    if matches!(head, "ls" | "dir" | "ll") {
        return CommandShape::Listing;
    }
    if trimmed == "git diff" || trimmed.starts_with("git diff ") {
        return CommandShape::GitDiff;
    }
    CommandShape::Plain
}

#[derive(Debug)]
pub struct ExecOutcome {
    pub output: String,
    pub exit_code: i32,
    pub truncated: bool,
    pub timed_out: bool,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run one command in a subshell with timeout and output cap.
pub async fn run_command(command: &str, cwd: &Path) -> anyhow::Result<ExecOutcome> {
    run_command_with(command, cwd, EXEC_TIMEOUT, OUTPUT_CAP).await
}

pub async fn run_command_with(
    command: &str,
    cwd: &Path,
    timeout: Duration,
    cap: usize,
) -> anyhow::Result<ExecOutcome> {
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawn: {command}"))?;

    let mut stdout = child.stdout.take().context("child stdout missing")?;
    let mut stderr = child.stderr.take().context("child stderr missing")?;

    let collect = async {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut out_buf = [0u8; 8192];
        let mut err_buf = [0u8; 8192];
        let mut out_open = true;
        let mut err_open = true;
        let mut truncated = false;

        while out_open || err_open {
            tokio::select! {
                read = stdout.read(&mut out_buf), if out_open => match read {
                    Ok(0) => out_open = false,
                    Ok(n) => {
                        if out.len() + err.len() + n > cap {
                            truncated = true;
                            out.extend_from_slice(&out_buf[..n.min(cap.saturating_sub(out.len() + err.len()))]);
                            break;
                        }
                        out.extend_from_slice(&out_buf[..n]);
                    }
                    Err(_) => out_open = false,
                },
                read = stderr.read(&mut err_buf), if err_open => match read {
                    Ok(0) => err_open = false,
                    Ok(n) => {
                        if out.len() + err.len() + n > cap {
                            truncated = true;
                            err.extend_from_slice(&err_buf[..n.min(cap.saturating_sub(out.len() + err.len()))]);
                            break;
                        }
                        err.extend_from_slice(&err_buf[..n]);
                    }
                    Err(_) => err_open = false,
                },
            }
        }
        (out, err, truncated)
    };

    let ((out, err, truncated), timed_out) = match tokio::time::timeout(timeout, collect).await {
        Ok(streams) => (streams, false),
        Err(_) => {
            let _ = child.start_kill();
            ((Vec::new(), Vec::new(), false), true)
        }
    };

    let exit_code = if timed_out {
        let _ = child.wait().await;
        -1
    } else {
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => status.code().unwrap_or(-1),
            _ => {
                let _ = child.start_kill();
                -1
            }
        }
    };

    let mut output = String::from_utf8_lossy(&out).into_owned();
    let err_text = String::from_utf8_lossy(&err);
    if !err_text.trim().is_empty() {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&err_text);
    }
    if truncated {
        output.push_str("\n[output truncated]");
    }
    if timed_out {
        output.push_str("[command timed out]");
    }

    Ok(ExecOutcome { output, exit_code, truncated, timed_out })
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
