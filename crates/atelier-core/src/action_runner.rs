//! Per-artifact action queue and executor.
//!
//! Actions are queued in declaration order as the parser emits open events
//! and executed by a single worker task, so a `shell` action never starts
//! before the `file` writes declared ahead of it have landed. Submission is
//! non-blocking: the parse loop hands an action over and keeps scanning
//! while the worker executes.
//!
//! Failures are reported through `AlertSink` and do not stop later actions;
//! retries are a caller/LLM decision, never automatic. Cancellation lets
//! the in-flight action finish but marks everything still queued as
//! aborted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atelier_runtime::{
    CommandRunner, DatabaseExecutor, DevServerRegistry, OutputReceiver, ProjectFs,
};

use crate::actions::{ActionKind, ActionState, SupabaseOperation};
use crate::alerts::{ActionAlert, AlertSink};
use crate::message_parser::ActionData;

/// Collaborators shared by every action runner.
#[derive(Clone)]
pub struct RunnerContext {
    pub fs: Arc<dyn ProjectFs>,
    pub commands: Arc<dyn CommandRunner>,
    pub dev_servers: Arc<DevServerRegistry>,
    pub database: Arc<dyn DatabaseExecutor>,
    pub alerts: Arc<dyn AlertSink>,
    pub output: Arc<dyn OutputReceiver>,
    /// Directory for supabase migration files, relative to the project root.
    pub migrations_dir: String,
}

/// A queued action and its lifecycle state.
#[derive(Debug, Clone)]
pub struct ActionEntry {
    pub kind: ActionKind,
    pub content: String,
    pub state: ActionState,
    /// Content is authoritative (the closing tag has been seen).
    finalized: bool,
}

/// Ordered action queue for one artifact.
pub struct ActionRunner {
    artifact_id: String,
    actions: Arc<Mutex<BTreeMap<u32, ActionEntry>>>,
    queue_tx: mpsc::UnboundedSender<u32>,
    cancellation: CancellationToken,
    pending: Arc<AtomicUsize>,
    idle_notify: Arc<Notify>,
    start_seen: bool,
}

impl ActionRunner {
    pub fn new(artifact_id: String, ctx: RunnerContext) -> Self {
        let actions: Arc<Mutex<BTreeMap<u32, ActionEntry>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<u32>();
        let cancellation = CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));
        let idle_notify = Arc::new(Notify::new());

        {
            let actions = actions.clone();
            let cancellation = cancellation.clone();
            let pending = pending.clone();
            let idle_notify = idle_notify.clone();
            let artifact_id = artifact_id.clone();
            let ctx = ctx.clone();

            tokio::spawn(async move {
                while let Some(action_id) = queue_rx.recv().await {
                    if cancellation.is_cancelled() {
                        let mut lock = actions.lock().await;
                        if let Some(entry) = lock.get_mut(&action_id) {
                            if !entry.state.is_terminal() {
                                debug!(
                                    "Marking action {}/{} aborted after cancellation",
                                    artifact_id, action_id
                                );
                                entry.state = ActionState::Aborted;
                            }
                        }
                    } else {
                        execute_action(&ctx, &artifact_id, action_id, &actions).await;
                    }

                    pending.fetch_sub(1, Ordering::SeqCst);
                    idle_notify.notify_waiters();
                }
            });
        }

        Self {
            artifact_id,
            actions,
            queue_tx,
            cancellation,
            pending,
            idle_notify,
            start_seen: false,
        }
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    /// Register an action from an open event. Refuses anything declared
    /// after a `start` action: `start` must be the last action.
    pub async fn add_action(&mut self, data: &ActionData) {
        if self.start_seen {
            warn!(
                "Refusing to queue {} action {} after a start action in artifact {}",
                data.kind.label(),
                data.action_id,
                self.artifact_id
            );
            return;
        }
        if data.kind.is_start() {
            self.start_seen = true;
        }

        let mut actions = self.actions.lock().await;
        actions.insert(
            data.action_id,
            ActionEntry {
                kind: data.kind.clone(),
                content: data.content.clone(),
                state: ActionState::Pending,
                finalized: false,
            },
        );
    }

    /// Submit an action for execution with its current content.
    ///
    /// With `is_streaming` set, only file actions are acted on (best-effort
    /// progressive write); everything else waits for the final call at
    /// action close. Submission never blocks on execution.
    pub async fn run_action(&self, data: &ActionData, is_streaming: bool) {
        if is_streaming && !data.kind.is_file() {
            return;
        }

        {
            let mut actions = self.actions.lock().await;
            let Some(entry) = actions.get_mut(&data.action_id) else {
                warn!(
                    "run_action for unknown action {} in artifact {}",
                    data.action_id, self.artifact_id
                );
                return;
            };
            if entry.finalized {
                // Final content already executed; later submissions are
                // duplicates.
                return;
            }
            entry.content = data.content.clone();
            if !is_streaming {
                entry.finalized = true;
            }
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.queue_tx.send(data.action_id).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Stop dispatching queued actions. The in-flight action finishes.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Wait until every submitted action has been processed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            tokio::pin!(notified);
            // Register for notification before re-checking the counter, so a
            // completion between the check and the await is not lost.
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Snapshot of the queue in declaration order.
    pub async fn action_entries(&self) -> Vec<(u32, ActionEntry)> {
        self.actions
            .lock()
            .await
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }
}

async fn execute_action(
    ctx: &RunnerContext,
    artifact_id: &str,
    action_id: u32,
    actions: &Mutex<BTreeMap<u32, ActionEntry>>,
) {
    let (kind, content, finalized) = {
        let mut lock = actions.lock().await;
        let Some(entry) = lock.get_mut(&action_id) else {
            return;
        };
        if matches!(entry.state, ActionState::Complete | ActionState::Aborted) {
            return;
        }
        entry.state = ActionState::Running;
        (entry.kind.clone(), entry.content.clone(), entry.finalized)
    };

    debug!(
        "Executing {} action {}/{} (finalized: {})",
        kind.label(),
        artifact_id,
        action_id,
        finalized
    );

    let result = match &kind {
        ActionKind::File { file_path } => ctx.fs.write(file_path, &content),
        ActionKind::Shell | ActionKind::Build => {
            run_command(ctx, &content).await
        }
        ActionKind::Start => run_start(ctx, artifact_id, &content),
        ActionKind::Supabase {
            operation,
            file_path,
            project_id: _,
        } => match operation {
            SupabaseOperation::Migration => write_migration(ctx, file_path.as_deref(), &content),
            SupabaseOperation::Query => ctx.database.execute_query(&content).await,
        },
    };

    let mut lock = actions.lock().await;
    let Some(entry) = lock.get_mut(&action_id) else {
        return;
    };

    match result {
        Ok(()) => {
            if finalized {
                entry.state = ActionState::Complete;
            }
            // Streamed best-effort runs stay Running until the final write.
        }
        Err(e) => {
            if finalized {
                let description = e.to_string();
                entry.state = ActionState::Failed {
                    error: description.clone(),
                };
                ctx.alerts
                    .on_alert(&ActionAlert::new(&kind, description, content));
            } else {
                // Best-effort streamed write; the close-time write decides.
                warn!(
                    "Streamed write for action {}/{} failed: {}",
                    artifact_id, action_id, e
                );
            }
        }
    }
}

async fn run_command(ctx: &RunnerContext, command: &str) -> anyhow::Result<()> {
    let result = ctx
        .commands
        .run(command, ctx.fs.root(), ctx.output.as_ref())
        .await?;

    if result.success {
        Ok(())
    } else {
        let stderr = result.stderr.trim();
        let stdout = result.stdout.trim();
        if !stderr.is_empty() {
            anyhow::bail!("exit code {}: {}", result.exit_code, stderr)
        } else if !stdout.is_empty() {
            anyhow::bail!("exit code {}: {}", result.exit_code, stdout)
        } else {
            anyhow::bail!("command failed with exit code {}", result.exit_code)
        }
    }
}

fn run_start(ctx: &RunnerContext, artifact_id: &str, command: &str) -> anyhow::Result<()> {
    if ctx.dev_servers.is_running(artifact_id) {
        info!(
            "Dev server for artifact {} already running; not restarting",
            artifact_id
        );
        return Ok(());
    }

    ctx.dev_servers
        .start(artifact_id, command, ctx.fs.root())
        .map(|_| ())
}

fn write_migration(
    ctx: &RunnerContext,
    file_path: Option<&str>,
    content: &str,
) -> anyhow::Result<()> {
    let Some(file_path) = file_path else {
        anyhow::bail!("migration action has no filePath");
    };

    // Migrations always land under the configured migrations directory.
    let relative = if file_path.starts_with(&ctx.migrations_dir) {
        file_path.to_string()
    } else {
        let file_name = std::path::Path::new(file_path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.to_string());
        format!("{}/{}", ctx.migrations_dir, file_name)
    };

    ctx.fs.write(&relative, content)
}
