//! The worker loop itself (spec §4.H): N consumer threads cooperating over one dispatcher
//! connection, reworked from the teacher's one-`std::thread`-per-worker model (`worker.rs`) into
//! `tokio` tasks, since the judging pipeline underneath is itself async.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Error};
use oj_worker_cache::CompileCache;
use oj_worker_exec::{SandboxRunner, Scheduler};
use oj_worker_format::{JudgeError, ProgressSnapshot, TestcaseStatus};
use oj_worker_store::FileStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{DispatcherChannel, ServerSideLimits, TaskPayload, WorkerClientMessage, WorkerServerMessage};
use crate::task;

/// Why the worker loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl-C or `--once` finished its one task (SPEC_FULL §16, spec §6 exit code `0`).
    Normal,
    /// The dispatcher connection was lost (spec §6 exit code `100`, "the dispatcher will
    /// redeliver").
    DispatcherLost,
}

/// Everything a consumer task needs to judge a submission, shared across all of them.
pub struct WorkerContext {
    pub file_store: Arc<FileStore>,
    pub cache: Arc<CompileCache>,
    pub scheduler: Arc<Scheduler>,
    pub sandboxes_dir: PathBuf,
    pub slots_root: PathBuf,
    pub runner: Arc<dyn SandboxRunner>,
    pub max_binary_size: u64,
    pub limits: ServerSideLimits,
}

/// Run `num_threads` consumer loops against `dispatcher` until the dispatcher connection is lost,
/// `shutdown` fires, or (with `once`) a single task has been judged.
pub async fn run(
    dispatcher: Arc<DispatcherChannel>,
    num_threads: usize,
    ctx: Arc<WorkerContext>,
    once: bool,
    shutdown: CancellationToken,
) -> Result<StopReason, Error> {
    let mut inboxes = HashMap::new();
    let mut routes = HashMap::new();
    for i in 0..num_threads {
        let (tx, rx) = mpsc::unbounded_channel();
        routes.insert(i, tx);
        inboxes.insert(i, rx);
    }
    let cancels: Arc<Mutex<HashMap<u64, CancellationToken>>> = Arc::new(Mutex::new(HashMap::new()));

    let router_dispatcher = dispatcher.clone();
    let router_cancels = cancels.clone();
    let router = tokio::task::spawn_blocking(move || -> Result<(), Error> {
        loop {
            match router_dispatcher.recv()? {
                WorkerServerMessage::Task { thread_index, task } => {
                    if let Some(route) = routes.get(&thread_index) {
                        let _ = route.send(task);
                    } else {
                        warn!("Dispatcher assigned task to unknown thread index {thread_index}");
                    }
                }
                WorkerServerMessage::Cancel { task_id } => {
                    if let Some(token) = router_cancels.lock().unwrap().get(&task_id) {
                        token.cancel();
                    }
                }
                WorkerServerMessage::Authorized { .. } | WorkerServerMessage::FileUrls { .. } => {}
                WorkerServerMessage::AuthFailed => {
                    bail!("Dispatcher rejected our authentication");
                }
            }
        }
    });

    let mut consumers = Vec::new();
    for (i, rx) in inboxes {
        let dispatcher = dispatcher.clone();
        let ctx = ctx.clone();
        let cancels = cancels.clone();
        let shutdown = shutdown.clone();
        consumers.push(tokio::spawn(async move {
            consumer_loop(i, dispatcher, rx, ctx, cancels, once, shutdown).await
        }));
    }

    tokio::select! {
        _ = router => {
            for c in &consumers {
                c.abort();
            }
            Ok(StopReason::DispatcherLost)
        }
        _ = shutdown.cancelled() => {
            for token in cancels.lock().unwrap().values() {
                token.cancel();
            }
            for c in consumers {
                let _ = c.await;
            }
            Ok(StopReason::Normal)
        }
    }
}

async fn consumer_loop(
    thread_index: usize,
    dispatcher: Arc<DispatcherChannel>,
    mut inbox: mpsc::UnboundedReceiver<TaskPayload>,
    ctx: Arc<WorkerContext>,
    cancels: Arc<Mutex<HashMap<u64, CancellationToken>>>,
    once: bool,
    shutdown: CancellationToken,
) {
    loop {
        if let Err(e) = dispatcher.send(WorkerClientMessage::Ready) {
            error!("Failed to announce readiness on thread {thread_index}: {e:#}");
            return;
        }
        if let Err(e) = dispatcher.send(WorkerClientMessage::Consume { thread_index }) {
            error!("Failed to announce consumption on thread {thread_index}: {e:#}");
            return;
        }

        let task = tokio::select! {
            task = inbox.recv() => match task {
                Some(task) => task,
                None => return,
            },
            _ = shutdown.cancelled() => return,
        };

        let task_id = task.task_id;
        let token = CancellationToken::new();
        cancels.lock().unwrap().insert(task_id, token.clone());

        if let Err(e) = judge_one(dispatcher.clone(), &ctx, task, token).await {
            warn!("Task {task_id} on thread {thread_index} did not complete cleanly: {e:#}");
        }
        cancels.lock().unwrap().remove(&task_id);

        if once {
            return;
        }
    }
}

async fn judge_one(
    dispatcher: Arc<DispatcherChannel>,
    ctx: &WorkerContext,
    payload: TaskPayload,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let task_id = payload.task_id;

    let (plan, manifest) = match task::parse_plan(&payload) {
        Ok(pair) => pair,
        Err(e) => {
            report_terminal_error(&dispatcher, task_id, &e);
            return Ok(());
        }
    };

    let (programs, compile) = match task::compile_all(
        &payload,
        &plan,
        &manifest,
        &ctx.file_store,
        &ctx.cache,
        &ctx.scheduler,
        ctx.sandboxes_dir.clone(),
        ctx.runner.clone(),
        ctx.max_binary_size,
        ctx.limits.compiler_message as usize,
    )
    .await
    {
        Ok(pair) => pair,
        Err(e) => {
            report_terminal_error(&dispatcher, task_id, &e);
            return Ok(());
        }
    };

    let debounced = Debouncer::new(Duration::from_millis(100), dispatcher.clone(), task_id);

    let result = tokio::select! {
        result = task::judge(
            &plan,
            payload.problem_type,
            &manifest,
            &programs,
            compile,
            ctx.slots_root.clone(),
            ctx.sandboxes_dir.clone(),
            ctx.limits.output_size,
            None,
            ctx.runner.clone(),
            debounced.callback(),
        ) => result,
        _ = cancel.cancelled() => {
            debounced.finish().await;
            return Ok(());
        }
    };
    debounced.finish().await;

    if let Err(e) = result {
        warn!("Task {task_id} finished with a judging error: {e:#}");
    }
    Ok(())
}

fn report_terminal_error(dispatcher: &DispatcherChannel, task_id: u64, error: &JudgeError) {
    let status = match error {
        JudgeError::Compilation(_) => TestcaseStatus::CompilationError,
        _ => TestcaseStatus::ConfigurationError,
    };
    let mut snapshot = ProgressSnapshot::preparing();
    snapshot.finish(status, 0.0);
    warn!("Task {task_id} failed validation: {error:#}");
    let _ = dispatcher.send(WorkerClientMessage::Progress {
        task_id,
        snapshot: Box::new(snapshot),
    });
}

/// Trailing-edge debouncer (spec §4.H step 4): coalesces bursts of progress updates into at most
/// one callback invocation per `interval`, always forwarding the *last* snapshot seen.
struct Debouncer {
    tx: mpsc::UnboundedSender<ProgressSnapshot>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Debouncer {
    fn new(interval: Duration, dispatcher: Arc<DispatcherChannel>, task_id: u64) -> Debouncer {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressSnapshot>();
        let handle = tokio::spawn(async move {
            let mut pending: Option<ProgressSnapshot> = None;
            loop {
                let sleep = tokio::time::sleep(interval);
                tokio::pin!(sleep);
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(snapshot) => pending = Some(snapshot),
                        None => {
                            if let Some(snapshot) = pending.take() {
                                flush(&dispatcher, task_id, snapshot);
                            }
                            return;
                        }
                    },
                    _ = &mut sleep, if pending.is_some() => {
                        if let Some(snapshot) = pending.take() {
                            flush(&dispatcher, task_id, snapshot);
                        }
                    }
                }
            }
        });
        Debouncer { tx, _handle: handle }
    }

    fn callback(&self) -> impl FnMut(&ProgressSnapshot) + Send + 'static {
        let tx = self.tx.clone();
        move |snapshot: &ProgressSnapshot| {
            let _ = tx.send(snapshot.clone());
        }
    }

    /// Drop this debouncer's own sender and wait for the background task to flush whatever
    /// snapshot is still pending, so the caller can rely on every update having been sent before
    /// moving on (spec §4.H step 6: "deregister cancellation, acknowledge the task").
    async fn finish(self) {
        drop(self.tx);
        let _ = self._handle.await;
    }
}

fn flush(dispatcher: &DispatcherChannel, task_id: u64, snapshot: ProgressSnapshot) {
    if let Err(e) = dispatcher.send(WorkerClientMessage::Progress {
        task_id,
        snapshot: Box::new(snapshot),
    }) {
        warn!("Failed to report progress for task {task_id}: {e:#}");
    }
}
