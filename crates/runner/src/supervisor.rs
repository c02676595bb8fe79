// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-run orchestrator.
//!
//! One task owns all mutable state; output pumps, the child reaper, and
//! the gateway forwarder are the only helpers, wired by channels. The
//! loop multiplexes child exit, prompt detections, the command poll tick,
//! and the heartbeat tick, and tears everything down on stop, halt, child
//! exit, or a fatal gateway response.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use drover_protocol::events::{EventKind, Marker};
use drover_protocol::redact::Redactor;
use drover_protocol::sentinel::Sentinel;
use drover_protocol::workers::{self, WorkerKind, WorkerSpec};

use crate::child::{self, WorkerChild, PROMPT_TIMEOUT};
use crate::client::{GatewayClient, GatewayError};
use crate::dedupe::{ProcessedSet, DEDUP_WINDOW};
use crate::events::{spawn_forwarder, RunnerEvent};
use crate::exec::{self, CommandShape};
use crate::prompts::{DetectedPrompt, PromptDetector, ANSWER_DELAY};
use crate::sandbox::Sandbox;
use crate::state_file::{self, RunnerState};

pub struct SupervisorSetup {
    pub run_id: String,
    pub working_dir: PathBuf,
    pub worker: WorkerKind,
    pub autonomous: bool,
    pub model: Option<String>,
    pub initial_prompt: Option<String>,
    pub original_command: Option<String>,
    pub runs_dir: PathBuf,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

struct Ctx {
    setup: SupervisorSetup,
    spec: &'static WorkerSpec,
    client: Arc<GatewayClient>,
    out_tx: mpsc::Sender<RunnerEvent>,
    prompt_tx: mpsc::Sender<DetectedPrompt>,
    redactor: Arc<Redactor>,
    detector: Arc<PromptDetector>,
    sandbox: Sandbox,
    processed: ProcessedSet,
    /// Pids of live prompt sub-processes, torn down on stop/halt.
    spawned: Arc<Mutex<HashSet<u32>>>,
    child_pid: Option<u32>,
    child_stdin: Option<ChildStdin>,
    pumps: Vec<tokio::task::JoinHandle<()>>,
    sequence: Arc<AtomicI64>,
    cancel: CancellationToken,
    stopping: bool,
    agent_id: String,
    run_dir: PathBuf,
    log_path: PathBuf,
}

/// Run the supervisor to completion; returns the run's exit code.
pub async fn run(setup: SupervisorSetup, client: GatewayClient) -> anyhow::Result<i32> {
    let spec = workers::spec(setup.worker);
    let run_dir = setup.runs_dir.join(&setup.run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("create run dir {}", run_dir.display()))?;
    let log_path = run_dir.join("runner.log");

    let sandbox = Sandbox::new(&setup.working_dir)?;
    let processed =
        ProcessedSet::open(Some(run_dir.join("processed.json")), DEDUP_WINDOW);

    // Resume: continue the sequence counter where the last wrapper left off.
    let state_path = run_dir.join("state.json");
    let start_sequence = match state_file::load(&state_path) {
        Ok(Some(prior)) => {
            tracing::info!(last_sequence = prior.last_sequence, "resuming from saved state");
            prior.last_sequence
        }
        Ok(None) => 0,
        Err(e) => {
            tracing::warn!(err = %e, "state.json unreadable; starting fresh");
            0
        }
    };
    let sequence = Arc::new(AtomicI64::new(start_sequence));

    let client = Arc::new(client);
    let cancel = CancellationToken::new();
    let (out_tx, out_rx) = mpsc::channel::<RunnerEvent>(256);
    let (prompt_tx, mut prompt_rx) = mpsc::channel::<DetectedPrompt>(16);
    let forwarder = spawn_forwarder(
        Arc::clone(&client),
        out_rx,
        Arc::clone(&sequence),
        cancel.clone(),
    );

    let agent_id = agent_id();
    let mut ctx = Ctx {
        spec,
        client,
        out_tx,
        prompt_tx,
        redactor: Arc::new(Redactor::new()),
        detector: Arc::new(PromptDetector::new()),
        sandbox,
        processed,
        spawned: Arc::new(Mutex::new(HashSet::new())),
        child_pid: None,
        child_stdin: None,
        pumps: Vec::new(),
        sequence,
        cancel: cancel.clone(),
        stopping: false,
        agent_id,
        run_dir,
        log_path,
        setup,
    };

    // Registration failures are logged, never fatal.
    if let Err(e) =
        ctx.client.register_client(&ctx.agent_id, &[ctx.setup.worker.as_str()]).await
    {
        tracing::warn!(err = %e, "client registration failed");
    }
    save_state(&ctx);
    push_state(&ctx).await;

    // Child or listener mode.
    let (exit_tx, mut exit_rx) = mpsc::channel::<i32>(1);
    let mut listener_keepalive = Some(exit_tx.clone());
    match ctx.setup.initial_prompt.clone() {
        Some(prompt) if ctx.spec.executes_commands && !ctx.spec.command.is_empty() => {
            listener_keepalive = None;
            start_child(&mut ctx, &prompt, exit_tx).await?;
        }
        _ => {
            // Listener mode: no child; commands and heartbeat only.
            emit_marker(
                &ctx,
                Marker::Started,
                serde_json::json!({ "mode": "listener", "workerType": ctx.setup.worker }),
            )
            .await;
            tracing::info!(run_id = %ctx.setup.run_id, "listener mode, waiting for input");
        }
    }

    let mut poll = tokio::time::interval(ctx.setup.poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut heartbeat = tokio::time::interval(ctx.setup.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut fatal = false;
    let exit_code = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // The gateway rejected us (or is gone for good): stop the
                // children and exit with a readable message below.
                teardown_children(&ctx);
                fatal = true;
                break 1;
            }
            Some(code) = exit_rx.recv() => {
                // Reap any prompt sub-processes, then drain remaining
                // output before the finish marker.
                kill_spawned(&ctx);
                for pump in ctx.pumps.drain(..) {
                    let _ = pump.await;
                }
                emit_marker(
                    &ctx,
                    Marker::Finished { exit_code: code },
                    serde_json::json!({ "stopRequested": ctx.stopping }),
                )
                .await;
                break code;
            }
            Some(prompt) = prompt_rx.recv() => {
                handle_prompt(&mut ctx, prompt).await;
            }
            _ = poll.tick() => {
                if let ControlFlow::Break(code) = poll_once(&mut ctx).await {
                    emit_marker(&ctx, Marker::Finished { exit_code: code }, serde_json::json!({ "stopRequested": true })).await;
                    break code;
                }
            }
            _ = heartbeat.tick() => {
                heartbeat_once(&ctx).await;
            }
        }
    };

    drop(listener_keepalive);
    finalize(&mut ctx, (!fatal).then_some(exit_code)).await;

    // Close the event channel so the forwarder drains and exits.
    let run_id = ctx.setup.run_id.clone();
    let log_path = ctx.log_path.clone();
    drop(ctx);
    let _ = forwarder.await;

    if fatal {
        anyhow::bail!(
            "gateway retired run {run_id}: request rejected (see log at {})",
            log_path.display()
        );
    }
    Ok(exit_code)
}

/// `<hostname>-<random8>`.
fn agent_id() -> String {
    use rand::distr::Alphanumeric;
    use rand::Rng;
    let host = nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "worker".to_owned());
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_lowercase())
        .take(8)
        .collect();
    format!("{host}-{suffix}")
}

async fn start_child(
    ctx: &mut Ctx,
    prompt: &str,
    exit_tx: mpsc::Sender<i32>,
) -> anyhow::Result<()> {
    let argv = workers::build_argv(
        ctx.setup.worker,
        prompt,
        ctx.setup.model.as_deref(),
        ctx.setup.autonomous,
    );
    let (mut worker, stdin, stdout, stderr) = WorkerChild::spawn(
        ctx.spec.command,
        &argv,
        ctx.sandbox.cwd(),
        ctx.spec.interactive,
    )?;
    ctx.child_pid = worker.pid();
    ctx.child_stdin = stdin;

    // The started marker goes out before the pumps can emit any output.
    let full_command = format!("{} {}", ctx.spec.command, argv.join(" "));
    tracing::info!(run_id = %ctx.setup.run_id, command = %full_command, "worker spawned");
    emit_marker(
        ctx,
        Marker::Started,
        serde_json::json!({
            "command": full_command,
            "workerType": ctx.setup.worker,
            "autonomous": ctx.setup.autonomous,
            "model": ctx.setup.model,
        }),
    )
    .await;

    let out_pump = spawn_pump(ctx, stdout, EventKind::Stdout);
    let err_pump = spawn_pump(ctx, stderr, EventKind::Stderr);
    ctx.pumps.push(out_pump);
    ctx.pumps.push(err_pump);

    tokio::spawn(async move {
        let code = worker.wait().await;
        let _ = exit_tx.send(code).await;
    });
    Ok(())
}

/// Spawn an output pump: raw chunk → local log → redact → prompt scan →
/// event. A tail of the last partial line carries across chunk reads so
/// prompts without a trailing newline are still seen.
fn spawn_pump<R>(ctx: &Ctx, mut reader: R, kind: EventKind) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let out_tx = ctx.out_tx.clone();
    let prompt_tx = ctx.prompt_tx.clone();
    let redactor = Arc::clone(&ctx.redactor);
    let detector = Arc::clone(&ctx.detector);
    let log_path = ctx.log_path.clone();

    tokio::spawn(async move {
        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .ok();
        let mut buf = vec![0u8; 8192];
        let mut tail = String::new();
        let mut last_prompt: Option<String> = None;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if let Some(ref mut log) = log {
                let _ = log.write_all(&buf[..n]).await;
            }

            let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
            let redacted = redactor.apply(&chunk);

            let scan = format!("{tail}{redacted}");
            if let Some(prompt) = detector.detect(&scan) {
                if last_prompt.as_deref() != Some(prompt.excerpt.as_str()) {
                    last_prompt = Some(prompt.excerpt.clone());
                    let _ = prompt_tx.send(prompt).await;
                }
                tail.clear();
            } else {
                tail = match scan.rsplit_once('\n') {
                    Some((_, partial)) => partial.to_owned(),
                    None => scan,
                };
                if tail.len() > 4096 {
                    tail.clear();
                }
            }

            if out_tx.send(RunnerEvent::output(kind, redacted)).await.is_err() {
                break;
            }
        }
    })
}

/// Prompt flow: announce, settle, auto-answer in autonomous mode.
async fn handle_prompt(ctx: &mut Ctx, prompt: DetectedPrompt) {
    tracing::info!(class = prompt.class.as_str(), excerpt = %prompt.excerpt, "prompt detected");
    send_event(
        ctx,
        RunnerEvent::output(
            EventKind::PromptWaiting,
            serde_json::json!({ "class": prompt.class.as_str(), "prompt": prompt.excerpt })
                .to_string(),
        ),
    )
    .await;

    if !ctx.setup.autonomous {
        return;
    }
    // Let the terminal settle before answering.
    tokio::time::sleep(ANSWER_DELAY).await;

    let answer = prompt.class.answer();
    let delivered = match ctx.child_stdin.as_mut() {
        Some(stdin) => stdin.write_all(answer.as_bytes()).await.is_ok(),
        None => false,
    };
    if delivered {
        if let Some(stdin) = ctx.child_stdin.as_mut() {
            let _ = stdin.flush().await;
        }
        send_event(
            ctx,
            RunnerEvent::output(
                EventKind::PromptResolved,
                serde_json::json!({ "class": prompt.class.as_str(), "answer": answer.trim() })
                    .to_string(),
            ),
        )
        .await;
    } else {
        tracing::warn!("prompt detected but worker has no stdin to answer");
    }
}

/// One poll pass: fetch pending commands and dispatch the unseen ones.
async fn poll_once(ctx: &mut Ctx) -> ControlFlow<i32> {
    let commands = match ctx.client.poll_commands().await {
        Ok(commands) => commands,
        Err(e) if e.is_fatal() => {
            tracing::error!(err = %e, "command poll rejected");
            ctx.cancel.cancel();
            return ControlFlow::Continue(());
        }
        Err(e) => {
            tracing::warn!(err = %e, "command poll failed");
            return ControlFlow::Continue(());
        }
    };

    for command in commands {
        if ctx.processed.contains(&command.id) {
            continue;
        }
        // Recorded (and persisted) before the handler runs: at-most-once
        // even if the ack never makes it out.
        ctx.processed.insert(&command.id);
        if let ControlFlow::Break(code) = dispatch(ctx, &command.id, &command.command).await {
            return ControlFlow::Break(code);
        }
    }
    ControlFlow::Continue(())
}

async fn dispatch(ctx: &mut Ctx, command_id: &str, command: &str) -> ControlFlow<i32> {
    tracing::debug!(command_id, command, "dispatching command");
    match Sentinel::parse(command) {
        Some(Sentinel::Stop) => {
            ctx.stopping = true;
            teardown_children(ctx);
            ack(ctx, command_id, Ok::<&str, String>("Stop initiated")).await;
            if ctx.child_pid.is_none() {
                // Listener mode: nothing to wait for.
                return ControlFlow::Break(0);
            }
            ControlFlow::Continue(())
        }
        Some(Sentinel::Halt) => {
            ctx.stopping = true;
            kill_spawned(ctx);
            if let Some(pid) = ctx.child_pid {
                child::hard_kill(pid);
            }
            ack(ctx, command_id, Ok::<&str, String>("Hard halt initiated")).await;
            if ctx.child_pid.is_none() {
                return ControlFlow::Break(0);
            }
            ControlFlow::Continue(())
        }
        Some(Sentinel::Escape) => {
            let outcome = match ctx.child_pid {
                Some(pid) => child::send_signal(pid, nix::sys::signal::Signal::SIGINT)
                    .map(|()| "Escape sent"),
                None => Err(anyhow::anyhow!("no worker process")),
            };
            ack(ctx, command_id, outcome.map_err(|e| e.to_string())).await;
            ControlFlow::Continue(())
        }
        Some(Sentinel::Input(text)) => {
            handle_input(ctx, command_id, &text).await;
            ControlFlow::Continue(())
        }
        None => {
            execute_literal(ctx, command_id, command).await;
            ControlFlow::Continue(())
        }
    }
}

/// `__INPUT__` delivery: stdin for interactive workers, a fresh prompt
/// process for the rest. A leading `\x03` becomes a SIGINT first.
async fn handle_input(ctx: &mut Ctx, command_id: &str, text: &str) {
    if !ctx.spec.executes_commands {
        ack(
            ctx,
            command_id,
            Ok::<&str, String>("This worker does not execute commands"),
        )
        .await;
        return;
    }

    let (interrupt, payload) = match text.strip_prefix('\u{3}') {
        Some(rest) => (true, rest.to_owned()),
        None => (false, text.to_owned()),
    };
    if interrupt {
        if let Some(pid) = ctx.child_pid {
            let _ = child::send_signal(pid, nix::sys::signal::Signal::SIGINT);
        }
    }

    if ctx.spec.interactive {
        let outcome = match ctx.child_stdin.as_mut() {
            Some(stdin) => {
                let mut data = payload.clone();
                if !data.ends_with('\n') {
                    data.push('\n');
                }
                stdin
                    .write_all(data.as_bytes())
                    .await
                    .map(|()| "Input sent")
                    .map_err(|e| e.to_string())
            }
            None => Err("worker has no stdin".to_owned()),
        };
        if outcome.is_ok() {
            if let Some(stdin) = ctx.child_stdin.as_mut() {
                let _ = stdin.flush().await;
            }
        }
        ack(ctx, command_id, outcome).await;
    } else {
        let outcome = spawn_prompt_process(ctx, &payload).map(|_| "Prompt process started");
        ack(ctx, command_id, outcome.map_err(|e| e.to_string())).await;
    }
}

/// Spawn a fresh worker process for one `__INPUT__` payload. Stdin is
/// closed immediately; output is pumped exactly like the main child's; a
/// hard timeout reaps runaways.
fn spawn_prompt_process(ctx: &mut Ctx, prompt: &str) -> anyhow::Result<u32> {
    let argv = workers::build_argv(
        ctx.setup.worker,
        prompt,
        ctx.setup.model.as_deref(),
        ctx.setup.autonomous,
    );
    let (mut worker, _stdin, stdout, stderr) =
        WorkerChild::spawn(ctx.spec.command, &argv, ctx.sandbox.cwd(), false)?;
    let pid = worker.pid().context("prompt process had no pid")?;
    ctx.spawned.lock().insert(pid);

    let out_pump = spawn_pump(ctx, stdout, EventKind::Stdout);
    let err_pump = spawn_pump(ctx, stderr, EventKind::Stderr);
    ctx.pumps.push(out_pump);
    ctx.pumps.push(err_pump);

    let spawned = Arc::clone(&ctx.spawned);
    let out_tx = ctx.out_tx.clone();
    tokio::spawn(async move {
        let code = match tokio::time::timeout(PROMPT_TIMEOUT, worker.wait()).await {
            Ok(code) => code,
            Err(_) => {
                child::hard_kill(pid);
                let _ = out_tx
                    .send(RunnerEvent::error("prompt process timed out after 5 minutes"))
                    .await;
                worker.wait().await
            }
        };
        spawned.lock().remove(&pid);
        let _ = out_tx
            .send(RunnerEvent::info(format!("prompt process exited with code {code}")))
            .await;
    });
    tracing::info!(pid, "prompt process spawned");
    Ok(pid)
}

/// Execute an allowlisted literal command with the sandbox special cases.
async fn execute_literal(ctx: &mut Ctx, command_id: &str, command: &str) {
    if !ctx.spec.executes_commands {
        ack(
            ctx,
            command_id,
            Ok::<&str, String>("This worker does not execute commands"),
        )
        .await;
        return;
    }

    match exec::classify(command) {
        CommandShape::ChangeDir(target) => {
            let outcome = ctx
                .sandbox
                .change_dir(&target)
                .map(|()| format!("Changed directory to {}", ctx.sandbox.rel_display()));
            ack(ctx, command_id, outcome.map_err(|e| e.to_string())).await;
        }
        CommandShape::PrintDir => {
            let rel = ctx.sandbox.rel_display();
            ack(ctx, command_id, Ok::<String, String>(rel)).await;
        }
        CommandShape::Listing => {
            let outcome = exec::run_command(command, ctx.sandbox.cwd()).await;
            let outcome = match outcome {
                Ok(run) if run.success() => {
                    Ok(format!("{}\n{}", ctx.sandbox.rel_display(), run.output))
                }
                Ok(run) => Err(run.output),
                Err(e) => Err(e.to_string()),
            };
            ack(ctx, command_id, outcome).await;
        }
        CommandShape::GitDiff => {
            let outcome = exec::run_command(command, ctx.sandbox.cwd()).await;
            match outcome {
                Ok(run) if run.success() => {
                    save_and_upload_diff(ctx, &run.output).await;
                    ack(ctx, command_id, Ok::<String, String>(run.output)).await;
                }
                Ok(run) => ack(ctx, command_id, Err::<String, String>(run.output)).await,
                Err(e) => ack(ctx, command_id, Err::<String, String>(e.to_string())).await,
            }
        }
        CommandShape::Plain => {
            let outcome = exec::run_command(command, ctx.sandbox.cwd()).await;
            let outcome = match outcome {
                Ok(run) if run.success() => Ok(run.output),
                Ok(run) => Err(run.output),
                Err(e) => Err(e.to_string()),
            };
            ack(ctx, command_id, outcome).await;
        }
    }
}

/// Persist `git diff` output locally and upload it as `latest.diff`.
async fn save_and_upload_diff(ctx: &Ctx, diff: &str) {
    let path = ctx.run_dir.join("latest.diff");
    if let Err(e) = tokio::fs::write(&path, diff).await {
        tracing::warn!(err = %e, "failed to save latest.diff");
    }
    if let Err(e) = ctx
        .client
        .upload_artifact("latest.diff", "diff", diff.as_bytes().to_vec())
        .await
    {
        tracing::warn!(err = %e, "failed to upload latest.diff");
    }
}

async fn ack<S: Into<String>, E: Into<String>>(
    ctx: &Ctx,
    command_id: &str,
    outcome: Result<S, E>,
) {
    let (result, error) = match outcome {
        Ok(result) => (Some(result.into()), None),
        Err(error) => (None, Some(error.into())),
    };
    let redacted_result = result.map(|r| ctx.redactor.apply(&r));
    if let Err(e) = ctx
        .client
        .ack_command(command_id, redacted_result.as_deref(), error.as_deref())
        .await
    {
        if e.is_fatal() {
            ctx.cancel.cancel();
        } else {
            // The processed-set entry still prevents re-execution.
            tracing::warn!(command_id, err = %e, "ack failed");
        }
    }
}

/// Stop everything we spawned: prompt processes, then the main child.
fn teardown_children(ctx: &Ctx) {
    kill_spawned(ctx);
    if let Some(pid) = ctx.child_pid {
        if let Err(e) = child::graceful_stop(pid) {
            tracing::warn!(err = %e, "graceful stop failed; killing");
            child::hard_kill(pid);
        }
    }
}

fn kill_spawned(ctx: &Ctx) {
    let pids: Vec<u32> = ctx.spawned.lock().iter().copied().collect();
    for pid in pids {
        child::hard_kill(pid);
    }
}

async fn send_event(ctx: &Ctx, event: RunnerEvent) {
    let _ = ctx.out_tx.send(event).await;
}

async fn emit_marker(ctx: &Ctx, marker: Marker, extra: serde_json::Value) {
    send_event(ctx, RunnerEvent::marker(emit_marker_payload(marker, extra))).await;
}

fn emit_marker_payload(marker: Marker, extra: serde_json::Value) -> String {
    marker.to_payload(Some(extra))
}

fn save_state(ctx: &Ctx) {
    let state = RunnerState {
        run_id: ctx.setup.run_id.clone(),
        working_dir: ctx.sandbox.cwd().to_string_lossy().into_owned(),
        original_command: ctx.setup.original_command.clone(),
        last_sequence: ctx.sequence.load(Ordering::SeqCst),
        worker_type: ctx.setup.worker.as_str().to_owned(),
        autonomous: ctx.setup.autonomous,
        updated_at: now_ms(),
    };
    if let Err(e) = state_file::save(&ctx.run_dir.join("state.json"), &state) {
        tracing::warn!(err = %e, "failed to save state.json");
    }
}

async fn push_state(ctx: &Ctx) {
    let result = ctx
        .client
        .upsert_state(
            Some(&ctx.sandbox.cwd().to_string_lossy()),
            ctx.setup.original_command.as_deref(),
            Some(ctx.sequence.load(Ordering::SeqCst)),
        )
        .await;
    if let Err(e) = result {
        if e.is_fatal() {
            ctx.cancel.cancel();
        } else {
            tracing::warn!(err = %e, "state upsert failed");
        }
    }
}

/// Heartbeat: local state, gateway state, client registry `last_seen_at`.
async fn heartbeat_once(ctx: &Ctx) {
    save_state(ctx);
    push_state(ctx).await;
    if let Err(e) = ctx
        .client
        .register_client(&ctx.agent_id, &[ctx.setup.worker.as_str()])
        .await
    {
        tracing::debug!(err = %e, "client heartbeat failed");
    }
}

/// Final bookkeeping: state, then best-effort log upload.
async fn finalize(ctx: &mut Ctx, exit_code: Option<i32>) {
    for pump in ctx.pumps.drain(..) {
        let _ = pump.await;
    }
    save_state(ctx);
    push_state(ctx).await;

    match tokio::fs::read(&ctx.log_path).await {
        Ok(contents) if !contents.is_empty() => {
            if let Err(e) = ctx.client.upload_artifact("runner.log", "log", contents).await {
                tracing::warn!(err = %e, "log upload failed");
            }
        }
        _ => {}
    }
    if let Some(code) = exit_code {
        tracing::info!(run_id = %ctx.setup.run_id, exit_code = code, "run finished");
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
