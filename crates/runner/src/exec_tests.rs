// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[yare::parameterized(
    cd_path    = { "cd src", CommandShape::ChangeDir("src".to_owned()) },
    cd_bare    = { "cd", CommandShape::ChangeDir("".to_owned()) },
    pwd        = { "pwd", CommandShape::PrintDir },
    ls         = { "ls -la", CommandShape::Listing },
    dir        = { "dir", CommandShape::Listing },
    ll         = { "ll src", CommandShape::Listing },
    git_diff   = { "git diff", CommandShape::GitDiff },
    git_diff_args = { "git diff HEAD~1", CommandShape::GitDiff },
    git_status = { "git status", CommandShape::Plain },
    npm_test   = { "npm test", CommandShape::Plain },
)]
fn classification(command: &str, expected: CommandShape) {
    assert_eq!(classify(command), expected);
}

#[tokio::test]
async fn captures_stdout_and_exit_code() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let outcome = run_command("echo hello", dir.path()).await?;
    assert!(outcome.success());
    assert_eq!(outcome.output.trim(), "hello");
    assert_eq!(outcome.exit_code, 0);
    Ok(())
}

#[tokio::test]
async fn merges_stderr_and_reports_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let outcome = run_command("echo oops >&2; exit 3", dir.path()).await?;
    assert!(!outcome.success());
    assert_eq!(outcome.exit_code, 3);
    assert!(outcome.output.contains("oops"));
    Ok(())
}

#[tokio::test]
async fn runs_in_the_given_cwd() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("marker.txt"), "x")?;
    let outcome = run_command("ls", dir.path()).await?;
    assert!(outcome.output.contains("marker.txt"));
    Ok(())
}

#[tokio::test]
async fn timeout_kills_the_subshell() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let started = std::time::Instant::now();
    let outcome =
        run_command_with("sleep 30", dir.path(), Duration::from_millis(200), OUTPUT_CAP).await?;
    assert!(outcome.timed_out);
    assert!(!outcome.success());
    assert!(outcome.output.contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn output_cap_truncates() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let outcome =
        run_command_with("yes x | head -c 100000", dir.path(), EXEC_TIMEOUT, 4096).await?;
    assert!(outcome.truncated);
    assert!(outcome.output.contains("[output truncated]"));
    assert!(outcome.output.len() < 8192);
    Ok(())
}
