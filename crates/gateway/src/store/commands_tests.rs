// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::runs::NewRun;
use crate::store::Store;

fn store() -> Store {
    #[allow(clippy::expect_used)]
    Store::open_in_memory().expect("open in-memory store")
}

#[tokio::test]
async fn enqueue_and_poll_in_creation_order() -> anyhow::Result<()> {
    let store = store();
    let run = store.create_run(NewRun::default()).await?;
    store.enqueue_command(&run.id, "git status").await?;
    store.enqueue_command(&run.id, "npm test").await?;

    let pending = store.pending_commands(&run.id).await?;
    assert_eq!(pending.iter().map(|c| c.command.as_str()).collect::<Vec<_>>(), vec![
        "git status",
        "npm test"
    ]);
    Ok(())
}

#[tokio::test]
async fn ack_is_idempotent() -> anyhow::Result<()> {
    let store = store();
    let run = store.create_run(NewRun::default()).await?;
    let cmd = store.enqueue_command(&run.id, "ls").await?;

    let first = store.ack_command(&cmd.id, Some("file.txt"), None).await?;
    let AckOutcome::First(row) = first else {
        anyhow::bail!("expected first ack, got {first:?}");
    };
    assert_eq!(row.result.as_deref(), Some("file.txt"));
    assert_eq!(row.status, CommandStatus::Completed);

    // Retry is accepted and ignores the new result.
    let second = store.ack_command(&cmd.id, Some("other"), None).await?;
    assert!(matches!(second, AckOutcome::AlreadyAcked));
    let reloaded = store.get_command(&cmd.id).await?;
    assert_eq!(reloaded.and_then(|c| c.result), Some("file.txt".to_owned()));

    let missing = store.ack_command("nope", None, None).await?;
    assert!(matches!(missing, AckOutcome::NotFound));
    Ok(())
}

#[tokio::test]
async fn acked_commands_leave_the_pending_set() -> anyhow::Result<()> {
    let store = store();
    let run = store.create_run(NewRun::default()).await?;
    let cmd = store.enqueue_command(&run.id, "pwd").await?;
    store.ack_command(&cmd.id, None, None).await?;
    assert!(store.pending_commands(&run.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn pending_duplicate_finds_only_same_pending_command() -> anyhow::Result<()> {
    let store = store();
    let run = store.create_run(NewRun::default()).await?;

    assert!(store.pending_duplicate(&run.id, "__STOP__").await?.is_none());
    let stop = store.enqueue_command(&run.id, "__STOP__").await?;
    let dup = store.pending_duplicate(&run.id, "__STOP__").await?;
    assert_eq!(dup.map(|c| c.id), Some(stop.id.clone()));

    // Different command or acked command is not a duplicate.
    assert!(store.pending_duplicate(&run.id, "__HALT__").await?.is_none());
    store.ack_command(&stop.id, None, None).await?;
    assert!(store.pending_duplicate(&run.id, "__STOP__").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn commands_are_scoped_to_their_run() -> anyhow::Result<()> {
    let store = store();
    let a = store.create_run(NewRun::default()).await?;
    let b = store.create_run(NewRun::default()).await?;
    store.enqueue_command(&a.id, "ls").await?;

    assert!(store.pending_commands(&b.id).await?.is_empty());
    Ok(())
}
