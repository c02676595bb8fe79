// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use drover_protocol::events::RunStatus;
use drover_protocol::workers::WorkerKind;

use super::*;
use crate::store::Store;

fn store() -> Store {
    #[allow(clippy::expect_used)]
    Store::open_in_memory().expect("open in-memory store")
}

#[tokio::test]
async fn create_run_defaults() -> anyhow::Result<()> {
    let store = store();
    let run = store
        .create_run(NewRun {
            command: Some("echo hi".to_owned()),
            working_dir: Some("/work".to_owned()),
            autonomous: true,
            worker_type: Some(WorkerKind::Codex),
            model: Some("o3".to_owned()),
            metadata: None,
        })
        .await?;

    assert_eq!(run.id.len(), 12);
    assert_eq!(run.status, RunStatus::Pending);
    assert!(run.capability_token.len() >= 42);
    assert_eq!(run.metadata["workingDir"], "/work");
    assert_eq!(run.metadata["model"], "o3");
    assert_eq!(run.metadata["autonomous"], true);

    let fetched = store.get_run(&run.id).await?;
    assert_eq!(fetched.map(|r| r.capability_token), Some(run.capability_token));
    Ok(())
}

#[tokio::test]
async fn started_and_finished_transitions() -> anyhow::Result<()> {
    let store = store();
    let run = store.create_run(NewRun::default()).await?;

    store.mark_started(&run.id).await?;
    let running = store.get_run(&run.id).await?.map(|r| (r.status, r.started_at.is_some()));
    assert_eq!(running, Some((RunStatus::Running, true)));

    let finished = store.mark_finished(&run.id, 0).await?;
    assert_eq!(finished, Some(RunStatus::Done));

    // Terminal states are permanent.
    let again = store.mark_finished(&run.id, 1).await?;
    assert_eq!(again, Some(RunStatus::Done));
    store.mark_started(&run.id).await?;
    assert_eq!(store.get_run(&run.id).await?.map(|r| r.status), Some(RunStatus::Done));
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_fails_and_stop_request_wins() -> anyhow::Result<()> {
    let store = store();
    let failing = store.create_run(NewRun::default()).await?;
    store.mark_started(&failing.id).await?;
    assert_eq!(store.mark_finished(&failing.id, 3).await?, Some(RunStatus::Failed));

    let stopped = store.create_run(NewRun::default()).await?;
    store.mark_started(&stopped.id).await?;
    store.set_stop_requested(&stopped.id).await?;
    // Even a clean exit resolves to stopped after an operator stop.
    assert_eq!(store.mark_finished(&stopped.id, 0).await?, Some(RunStatus::Stopped));
    Ok(())
}

#[tokio::test]
async fn list_runs_filters_and_pages() -> anyhow::Result<()> {
    let store = store();
    for i in 0..5 {
        let run = store
            .create_run(NewRun { command: Some(format!("job {i}")), ..NewRun::default() })
            .await?;
        if i < 2 {
            store.mark_started(&run.id).await?;
        }
    }

    let (all, total) = store.list_runs(None, None, 100, 0).await?;
    assert_eq!(total, 5);
    assert_eq!(all.len(), 5);

    let (running, running_total) =
        store.list_runs(Some(RunStatus::Running), None, 100, 0).await?;
    assert_eq!(running_total, 2);
    assert!(running.iter().all(|r| r.status == RunStatus::Running));

    let (searched, searched_total) = store.list_runs(None, Some("job 3"), 100, 0).await?;
    assert_eq!(searched_total, 1);
    assert_eq!(searched[0].command.as_deref(), Some("job 3"));

    let (page, page_total) = store.list_runs(None, None, 2, 4).await?;
    assert_eq!(page_total, 5);
    assert_eq!(page.len(), 1);
    Ok(())
}

#[tokio::test]
async fn restart_links_back_and_issues_fresh_token() -> anyhow::Result<()> {
    let store = store();
    let origin = store
        .create_run(NewRun {
            command: Some("npm test".to_owned()),
            autonomous: true,
            worker_type: Some(WorkerKind::Gemini),
            ..NewRun::default()
        })
        .await?;

    let restarted = store.restart_run(&origin, None, Some("/elsewhere".to_owned())).await?;
    assert_ne!(restarted.id, origin.id);
    assert_ne!(restarted.capability_token, origin.capability_token);
    assert_eq!(restarted.command.as_deref(), Some("npm test"));
    assert_eq!(restarted.worker_type, WorkerKind::Gemini);
    assert_eq!(restarted.metadata["restartedFrom"], origin.id.as_str());
    assert_eq!(restarted.metadata["workingDir"], "/elsewhere");
    assert_eq!(restarted.metadata["autonomous"], true);

    let overridden = store.restart_run(&origin, Some("npm run lint".to_owned()), None).await?;
    assert_eq!(overridden.command.as_deref(), Some("npm run lint"));
    Ok(())
}

#[tokio::test]
async fn claim_pending_run_assigns_oldest() -> anyhow::Result<()> {
    let store = store();
    let first = store.create_run(NewRun::default()).await?;
    let _second = store.create_run(NewRun::default()).await?;

    let claimed = store.claim_pending_run("client-1", None).await?;
    assert_eq!(claimed.as_ref().map(|r| r.id.as_str()), Some(first.id.as_str()));
    assert_eq!(claimed.and_then(|r| r.client_id), Some("client-1".to_owned()));

    // Claimed run is no longer claimable.
    let next = store.claim_pending_run("client-2", None).await?;
    assert!(next.is_some_and(|r| r.id != first.id));
    assert!(store.claim_pending_run("client-3", None).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn claim_respects_worker_type_filter() -> anyhow::Result<()> {
    let store = store();
    let _claude = store.create_run(NewRun::default()).await?;
    let rev = store
        .create_run(NewRun { worker_type: Some(WorkerKind::Rev), ..NewRun::default() })
        .await?;

    let claimed = store.claim_pending_run("c", Some(WorkerKind::Rev)).await?;
    assert_eq!(claimed.map(|r| r.id), Some(rev.id));
    Ok(())
}

#[tokio::test]
async fn run_state_coalesce_upsert() -> anyhow::Result<()> {
    let store = store();
    let run = store.create_run(NewRun::default()).await?;

    store
        .upsert_run_state(&run.id, RunStatePatch {
            working_dir: Some("/work".to_owned()),
            original_command: Some("echo hi".to_owned()),
            last_sequence: Some(4),
            ..RunStatePatch::default()
        })
        .await?;

    // Omitted fields preserve the prior value.
    store
        .upsert_run_state(&run.id, RunStatePatch {
            last_sequence: Some(9),
            ..RunStatePatch::default()
        })
        .await?;

    let state = store.get_run_state(&run.id).await?;
    let state = state.ok_or_else(|| anyhow::anyhow!("missing state"))?;
    assert_eq!(state.working_dir.as_deref(), Some("/work"));
    assert_eq!(state.original_command.as_deref(), Some("echo hi"));
    assert_eq!(state.last_sequence, Some(9));
    Ok(())
}

#[tokio::test]
async fn delete_run_cascades() -> anyhow::Result<()> {
    let store = store();
    let run = store.create_run(NewRun::default()).await?;
    store
        .append_event(&run.id, drover_protocol::events::EventKind::Stdout, "hi", None)
        .await?;
    store.enqueue_command(&run.id, "__STOP__").await?;
    store.insert_artifact("a1", &run.id, "log.txt", "text", 2, "/tmp/a1").await?;
    store
        .upsert_run_state(&run.id, RunStatePatch {
            working_dir: Some("/w".to_owned()),
            ..RunStatePatch::default()
        })
        .await?;

    let paths = store.delete_run(&run.id).await?;
    assert_eq!(paths, Some(vec!["/tmp/a1".to_owned()]));
    assert!(store.get_run(&run.id).await?.is_none());
    assert!(store.list_events(&run.id, 0, 10).await?.is_empty());
    assert!(store.pending_commands(&run.id).await?.is_empty());
    assert!(store.get_run_state(&run.id).await?.is_none());

    // Second delete reports not-found.
    assert_eq!(store.delete_run(&run.id).await?, None);
    Ok(())
}
