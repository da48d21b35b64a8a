//! The database controller.
//!
//! [`AsyncDatabase`] is the only way callers reach the worker thread. It tags
//! every request with an id, keeps a table of pending requests, enforces the
//! per-class timeouts and retries transient failures. A supervisor task per
//! worker generation routes replies back to their callers and, when the worker
//! dies unexpectedly, rejects everything in flight and restarts it with a
//! linearly growing delay until the lifetime restart budget is spent.

use crate::protocol::{
    Envelope, ExitReason, Method, Reply, RequestId, WorkerCommand, WorkerEvent, WorkerResult,
};
use crate::retry::{restart_delay, OperationClass, RetryDecision, RetryPolicy, Timeouts};
use crate::statement::PreparedStatement;
use crate::value::{FromRow, RunResult};
use crate::worker::{self, WorkerHandle};
use crate::{DatabaseError, DatabaseKey, DatabaseResult, ErrorCause, WorkerError, WorkerFailureKind};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rusqlite::types::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{broadcast, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub timeouts: Timeouts,
    pub retry: RetryPolicy,
    /// Interval of the background liveness probe.
    pub health_check_interval: Duration,
    /// Lifetime ceiling on worker restarts.
    pub max_restarts: u32,
    pub restart_base_delay: Duration,
    pub restart_max_delay: Duration,
    /// How long a new worker may take to open, unlock and migrate the file.
    pub startup_timeout: Duration,
    pub termination_attempts: u32,
    /// How long to wait for each shutdown acknowledgement.
    pub termination_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            retry: RetryPolicy::default(),
            health_check_interval: Duration::from_secs(30),
            max_restarts: 3,
            restart_base_delay: Duration::from_secs(1),
            restart_max_delay: Duration::from_secs(10),
            startup_timeout: Duration::from_secs(60),
            termination_attempts: 3,
            termination_timeout: Duration::from_secs(5),
        }
    }
}

/// Controller state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Starting,
    Ready,
    Restarting,
    /// Restart budget exhausted. Terminal until closed.
    Failed { restarts: u32, last_failure: String },
    Closing,
    Closed,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Starting => "starting",
            Lifecycle::Ready => "ready",
            Lifecycle::Restarting => "restarting",
            Lifecycle::Failed { .. } => "failed",
            Lifecycle::Closing => "closing",
            Lifecycle::Closed => "closed",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications for hosts that watch the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEvent {
    HealthCheckFailed {
        message: String,
    },
    WorkerCrashed {
        generation: u64,
        kind: WorkerFailureKind,
        rejected: usize,
    },
    WorkerRestarted {
        generation: u64,
        restarts: u32,
    },
    RestartBudgetExhausted {
        restarts: u32,
    },
    Closed,
}

/// Point-in-time snapshot of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub lifecycle: Lifecycle,
    pub pending: usize,
    pub restarts: u32,
    pub generation: u64,
}

struct PendingRequest {
    operation: &'static str,
    retry_count: u32,
    sent_at: Instant,
    reply: oneshot::Sender<DatabaseResult<WorkerResult>>,
}

/// Removes a pending entry when its caller stops waiting.
struct PendingCleanup<'a> {
    pending: &'a Mutex<HashMap<RequestId, PendingRequest>>,
    id: RequestId,
}

impl Drop for PendingCleanup<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// Why a worker could not be brought up.
enum StartFailure {
    Spawn(std::io::Error),
    Open(WorkerError),
    Exited(ExitReason),
    Timeout(Duration),
}

impl StartFailure {
    fn kind(&self) -> WorkerFailureKind {
        match self {
            StartFailure::Spawn(_) | StartFailure::Open(_) => WorkerFailureKind::ConnectionFailed,
            StartFailure::Exited(reason) => failure_kind(reason),
            StartFailure::Timeout(_) => WorkerFailureKind::Timeout,
        }
    }

    fn into_error(self) -> DatabaseError {
        match self {
            StartFailure::Spawn(e) => DatabaseError::Io(e),
            StartFailure::Open(e) if e.cause == ErrorCause::NotADatabase => {
                DatabaseError::KeyMismatch
            }
            StartFailure::Open(e) => DatabaseError::Open(e),
            StartFailure::Exited(reason) => DatabaseError::Open(WorkerError::new(
                ErrorCause::Other,
                format!("worker exited during startup ({reason:?})"),
            )),
            StartFailure::Timeout(timeout) => DatabaseError::Timeout {
                operation: "open",
                timeout,
            },
        }
    }
}

impl fmt::Display for StartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartFailure::Spawn(e) => write!(f, "could not spawn worker thread: {e}"),
            StartFailure::Open(e) => write!(f, "could not open database: {e}"),
            StartFailure::Exited(reason) => write!(f, "worker exited during startup ({reason:?})"),
            StartFailure::Timeout(t) => write!(f, "worker not ready after {t:?}"),
        }
    }
}

fn failure_kind(reason: &ExitReason) -> WorkerFailureKind {
    match reason {
        ExitReason::Panicked => WorkerFailureKind::Unknown,
        ExitReason::OpenFailed => WorkerFailureKind::ConnectionFailed,
        ExitReason::Shutdown | ExitReason::ChannelClosed => WorkerFailureKind::Terminated,
    }
}

pub(crate) struct Inner {
    path: PathBuf,
    key: Option<DatabaseKey>,
    pub(crate) config: DatabaseConfig,
    next_id: AtomicU64,
    generation: AtomicU64,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    worker: Mutex<Option<WorkerHandle>>,
    restarts: AtomicU32,
    lifecycle: watch::Sender<Lifecycle>,
    /// Shared by statements, exclusive for a whole transaction.
    pub(crate) gate: RwLock<()>,
    events: broadcast::Sender<DatabaseEvent>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle on an open database. Cheap to clone; all clones share one worker.
#[derive(Clone)]
pub struct AsyncDatabase {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for AsyncDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDatabase")
            .field("lifecycle", &*self.inner.lifecycle.borrow())
            .field("generation", &self.inner.current_generation())
            .finish_non_exhaustive()
    }
}

impl AsyncDatabase {
    /// Open (creating if needed) the database at `path`.
    ///
    /// With a key the file is encrypted at rest; a key that does not match an
    /// existing file fails with [`DatabaseError::KeyMismatch`]. Open failures are
    /// returned directly and never consume the restart budget.
    pub async fn open(
        path: &Path,
        key: Option<DatabaseKey>,
        config: DatabaseConfig,
    ) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!(path = %path.display(), encrypted = key.is_some(), "Opening database");

        let (handle, events) =
            start_worker(path.to_path_buf(), key.clone(), 1, config.startup_timeout)
                .await
                .map_err(StartFailure::into_error)?;

        let (lifecycle, _) = watch::channel(Lifecycle::Starting);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            path: path.to_path_buf(),
            key,
            config,
            next_id: AtomicU64::new(1),
            generation: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            worker: Mutex::new(Some(handle)),
            restarts: AtomicU32::new(0),
            lifecycle,
            gate: RwLock::new(()),
            events: events_tx,
            health_task: Mutex::new(None),
        });

        tokio::spawn(supervise(Arc::downgrade(&inner), 1, events));
        inner.lifecycle.send_replace(Lifecycle::Ready);

        let db = Self { inner };
        db.spawn_health_task();
        info!("Database ready");
        Ok(db)
    }

    /// Execute a statement that modifies rows.
    pub async fn run(&self, sql: &str, params: Vec<Value>) -> DatabaseResult<RunResult> {
        self.execute(Method::Run {
            sql: sql.to_string(),
            params,
        })
        .await?
        .into_run("run")
    }

    /// First row of a query, if any.
    pub async fn get<T: FromRow>(&self, sql: &str, params: Vec<Value>) -> DatabaseResult<Option<T>> {
        let row = self
            .execute(Method::Get {
                sql: sql.to_string(),
                params,
            })
            .await?
            .into_row("get")?;
        row.as_ref().map(T::from_row).transpose()
    }

    /// Every row of a query.
    pub async fn all<T: FromRow>(&self, sql: &str, params: Vec<Value>) -> DatabaseResult<Vec<T>> {
        self.execute(Method::All {
            sql: sql.to_string(),
            params,
        })
        .await?
        .into_rows("all")?
        .iter()
        .map(T::from_row)
        .collect()
    }

    /// Execute one or more statements without parameters or results.
    pub async fn exec(&self, sql: &str) -> DatabaseResult<()> {
        self.execute(Method::Exec {
            sql: sql.to_string(),
        })
        .await?
        .into_done("exec")
    }

    /// Prepare a statement for repeated use.
    ///
    /// Syntax errors surface here. The statement survives worker restarts.
    pub async fn prepare(&self, sql: &str) -> DatabaseResult<PreparedStatement> {
        PreparedStatement::new(self.clone(), sql).await
    }

    /// Probe the worker with a trivial query.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.inner.ready_now()?;
        self.inner.ping().await
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.borrow().clone()
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            lifecycle: self.lifecycle(),
            pending: self.inner.pending.lock().len(),
            restarts: self.inner.restarts.load(Ordering::SeqCst),
            generation: self.inner.current_generation(),
        }
    }

    /// Stream of controller events. Slow receivers may observe lag.
    pub fn subscribe(&self) -> broadcast::Receiver<DatabaseEvent> {
        self.inner.events.subscribe()
    }

    /// Close the database.
    ///
    /// Pending requests fail with [`DatabaseError::Closing`]. Closing twice is a
    /// no-op. If the worker does not acknowledge shutdown after the configured
    /// attempts, [`DatabaseError::Termination`] is returned and the thread is
    /// abandoned.
    pub async fn close(&self) -> DatabaseResult<()> {
        let inner = &self.inner;
        let mut was_open = false;
        inner.lifecycle.send_if_modified(|state| {
            if matches!(state, Lifecycle::Closing | Lifecycle::Closed) {
                false
            } else {
                *state = Lifecycle::Closing;
                was_open = true;
                true
            }
        });
        if !was_open {
            return Ok(());
        }

        info!("Closing database");
        if let Some(task) = inner.health_task.lock().take() {
            task.abort();
        }

        let rejected = inner.drain_pending();
        if !rejected.is_empty() {
            debug!(count = rejected.len(), "Rejecting pending requests on close");
        }
        for request in rejected {
            let _ = request.reply.send(Err(DatabaseError::Closing));
        }

        let handle = inner.worker.lock().take();
        let result = match handle {
            Some(handle) => inner.terminate(handle).await,
            None => Ok(()),
        };

        inner.lifecycle.send_replace(Lifecycle::Closed);
        inner.emit(DatabaseEvent::Closed);
        info!("Database closed");
        result
    }

    async fn execute(&self, method: Method) -> DatabaseResult<WorkerResult> {
        let _shared = self.inner.gate.read().await;
        let operation = method.name();
        let class = method.class();
        let inner = &*self.inner;
        inner
            .with_retry(operation, class, |retry| inner.dispatch(method.clone(), retry))
            .await
    }

    fn spawn_health_task(&self) {
        let interval = self.inner.config.health_check_interval;
        if interval.is_zero() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !matches!(*inner.lifecycle.borrow(), Lifecycle::Ready) {
                    continue;
                }
                match inner.ping().await {
                    Ok(()) => debug!("Database health check passed"),
                    Err(e) => {
                        warn!(error = %e, "Database health check failed");
                        inner.emit(DatabaseEvent::HealthCheckFailed {
                            message: e.to_string(),
                        });
                    }
                }
            }
        });
        *self.inner.health_task.lock() = Some(task);
    }

    /// Panic the current worker thread.
    #[cfg(test)]
    pub(crate) fn crash_worker(&self) -> bool {
        self.inner
            .worker
            .lock()
            .as_ref()
            .map(|w| w.send(WorkerCommand::Crash).is_ok())
            .unwrap_or(false)
    }
}

impl Inner {
    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Queue a command whose reply nobody waits for.
    pub(crate) fn send_untracked(&self, command: WorkerCommand) {
        if let Some(worker) = self.worker.lock().as_ref() {
            let _ = worker.send(command);
        }
    }

    fn emit(&self, event: DatabaseEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn drain_pending(&self) -> Vec<PendingRequest> {
        self.pending.lock().drain().map(|(_, p)| p).collect()
    }

    /// `Ok` only when the worker is ready right now.
    fn ready_now(&self) -> DatabaseResult<()> {
        let state = self.lifecycle.borrow().clone();
        match lifecycle_error(&state) {
            Some(outcome) => outcome,
            None => Err(DatabaseError::WorkerFailure {
                kind: WorkerFailureKind::Terminated,
                operation: "health_check",
                retry_count: 0,
                message: format!("database worker is {state}"),
            }),
        }
    }

    /// Wait until the worker is ready, or fail if it never will be.
    pub(crate) async fn wait_ready(&self) -> DatabaseResult<()> {
        let mut rx = self.lifecycle.subscribe();
        loop {
            let outcome = lifecycle_error(&rx.borrow_and_update());
            if let Some(outcome) = outcome {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Err(DatabaseError::Closed);
            }
        }
    }

    /// Send one request to the current worker and wait for its reply.
    ///
    /// No lifecycle check and no retry; callers layer those on top.
    pub(crate) async fn dispatch(&self, method: Method, retry_count: u32) -> DatabaseResult<WorkerResult> {
        let operation = method.name();
        let timeout = self.config.timeouts.for_class(method.class());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        self.pending.lock().insert(
            id,
            PendingRequest {
                operation,
                retry_count,
                sent_at: Instant::now(),
                reply: reply_tx,
            },
        );
        let _cleanup = PendingCleanup {
            pending: &self.pending,
            id,
        };

        let sent = match self.worker.lock().as_ref() {
            Some(worker) => worker
                .send(WorkerCommand::Execute(Envelope { id, method }))
                .is_ok(),
            None => false,
        };
        if !sent {
            return Err(DatabaseError::WorkerFailure {
                kind: WorkerFailureKind::Terminated,
                operation,
                retry_count,
                message: "database worker is not running".to_string(),
            });
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DatabaseError::WorkerFailure {
                kind: WorkerFailureKind::Unknown,
                operation,
                retry_count,
                message: "reply channel dropped".to_string(),
            }),
            Err(_) => {
                warn!(operation, id, ?timeout, "Database request timed out");
                Err(DatabaseError::Timeout { operation, timeout })
            }
        }
    }

    /// Run `attempt` until it succeeds, fails fatally, or the budget for
    /// `class` is spent. `attempt` receives the number of retries so far.
    pub(crate) async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        class: OperationClass,
        mut attempt: F,
    ) -> DatabaseResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DatabaseResult<T>>,
    {
        let mut n = 1;
        loop {
            self.wait_ready().await?;
            let err = match attempt(n - 1).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            match self.config.retry.decide(&err, n, class) {
                RetryDecision::Retry(delay) => {
                    debug!(operation, attempt = n, ?delay, error = %err, "Retrying database operation");
                    tokio::time::sleep(delay).await;
                    n += 1;
                }
                RetryDecision::Exhausted => {
                    warn!(operation, attempts = n, error = %err, "Database operation retries exhausted");
                    return Err(DatabaseError::RetriesExhausted {
                        operation,
                        attempts: n,
                        source: Box::new(err),
                    });
                }
                RetryDecision::Fatal => return Err(err),
            }
        }
    }

    async fn ping(&self) -> DatabaseResult<()> {
        self.dispatch(
            Method::Get {
                sql: "SELECT 1".to_string(),
                params: Vec::new(),
            },
            0,
        )
        .await
        .map(|_| ())
    }

    fn deliver(&self, reply: Reply) {
        let pending = self.pending.lock().remove(&reply.id);
        match pending {
            Some(request) => {
                debug!(
                    id = reply.id,
                    operation = request.operation,
                    elapsed_ms = request.sent_at.elapsed().as_millis() as u64,
                    "Database request completed"
                );
                let result = reply
                    .result
                    .map_err(|e| DatabaseError::from_worker(request.operation, e));
                let _ = request.reply.send(result);
            }
            None => debug!(id = reply.id, "Discarding reply for abandoned request"),
        }
    }

    fn reject_pending(&self, kind: WorkerFailureKind, message: &str) -> usize {
        let rejected = self.drain_pending();
        let count = rejected.len();
        for request in rejected {
            let _ = request.reply.send(Err(DatabaseError::WorkerFailure {
                kind,
                operation: request.operation,
                retry_count: request.retry_count,
                message: message.to_string(),
            }));
        }
        count
    }

    async fn handle_exit(self: &Arc<Self>, generation: u64, reason: ExitReason) {
        let is_current = self
            .worker
            .lock()
            .as_ref()
            .is_some_and(|w| w.generation() == generation);
        if !is_current {
            debug!(generation, ?reason, "Retired database worker exited");
            return;
        }

        let kind = failure_kind(&reason);
        let message = format!("database worker {generation} exited ({reason:?})");

        let mut crashed = false;
        self.lifecycle.send_if_modified(|state| {
            if matches!(state, Lifecycle::Ready | Lifecycle::Starting) {
                *state = Lifecycle::Restarting;
                crashed = true;
                true
            } else {
                false
            }
        });

        if !crashed {
            // A restart is already verifying this worker, or we are shutting down.
            if matches!(*self.lifecycle.borrow(), Lifecycle::Restarting) {
                self.reject_pending(kind, &message);
            }
            return;
        }

        error!(generation, code = reason.code(), %kind, "Database worker crashed");
        let rejected = self.reject_pending(kind, &message);
        self.emit(DatabaseEvent::WorkerCrashed {
            generation,
            kind,
            rejected,
        });
        self.restart(message).await;
    }

    async fn restart(self: &Arc<Self>, mut last_failure: String) {
        loop {
            let restarts = self.restarts.load(Ordering::SeqCst);
            if restarts >= self.config.max_restarts {
                error!(restarts, last_failure = %last_failure, "Database worker restart budget exhausted");
                self.worker.lock().take();
                self.lifecycle.send_replace(Lifecycle::Failed {
                    restarts,
                    last_failure,
                });
                self.emit(DatabaseEvent::RestartBudgetExhausted { restarts });
                return;
            }

            let restart = restarts + 1;
            self.restarts.store(restart, Ordering::SeqCst);
            let delay = restart_delay(
                restart,
                self.config.restart_base_delay,
                self.config.restart_max_delay,
            );
            warn!(restart, max_restarts = self.config.max_restarts, ?delay, "Restarting database worker");
            tokio::time::sleep(delay).await;

            if !matches!(*self.lifecycle.borrow(), Lifecycle::Restarting) {
                return;
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let started = start_worker(
                self.path.clone(),
                self.key.clone(),
                generation,
                self.config.startup_timeout,
            )
            .await;

            let (handle, events) = match started {
                Ok(started) => started,
                Err(failure) => {
                    warn!(generation, kind = %failure.kind(), error = %failure, "Database worker restart failed");
                    last_failure = failure.to_string();
                    continue;
                }
            };

            self.worker.lock().replace(handle);
            tokio::spawn(supervise(Arc::downgrade(self), generation, events));

            if let Err(e) = self.ping().await {
                warn!(generation, error = %e, "Restarted database worker failed verification");
                last_failure = e.to_string();
                if let Some(handle) = self.worker.lock().take() {
                    let (ack, _) = oneshot::channel();
                    let _ = handle.send(WorkerCommand::Shutdown(ack));
                }
                continue;
            }

            let recovered = self.lifecycle.send_if_modified(|state| {
                if matches!(state, Lifecycle::Restarting) {
                    *state = Lifecycle::Ready;
                    true
                } else {
                    false
                }
            });
            if recovered {
                info!(generation, restarts = restart, "Database worker restarted");
                self.emit(DatabaseEvent::WorkerRestarted {
                    generation,
                    restarts: restart,
                });
            }
            return;
        }
    }

    async fn terminate(&self, handle: WorkerHandle) -> DatabaseResult<()> {
        let attempts = self.config.termination_attempts.max(1);
        for attempt in 1..=attempts {
            let (ack_tx, ack_rx) = oneshot::channel();
            if handle.send(WorkerCommand::Shutdown(ack_tx)).is_err() {
                debug!("Database worker already stopped");
                handle.join().await;
                return Ok(());
            }
            // A dropped ack means the worker exited anyway.
            if tokio::time::timeout(self.config.termination_timeout, ack_rx)
                .await
                .is_ok()
            {
                handle.join().await;
                return Ok(());
            }
            warn!(attempt, attempts, "Database worker did not acknowledge shutdown");
        }
        error!(attempts, "Abandoning unresponsive database worker");
        Err(DatabaseError::Termination { attempts })
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.health_task.get_mut().take() {
            task.abort();
        }
    }
}

fn lifecycle_error(state: &Lifecycle) -> Option<DatabaseResult<()>> {
    match state {
        Lifecycle::Ready => Some(Ok(())),
        Lifecycle::Failed {
            restarts,
            last_failure,
        } => Some(Err(DatabaseError::RestartBudgetExhausted {
            restarts: *restarts,
            last_failure: last_failure.clone(),
        })),
        Lifecycle::Closing => Some(Err(DatabaseError::Closing)),
        Lifecycle::Closed => Some(Err(DatabaseError::Closed)),
        Lifecycle::Starting | Lifecycle::Restarting => None,
    }
}

/// Spawn a worker and wait for it to report ready.
async fn start_worker(
    path: PathBuf,
    key: Option<DatabaseKey>,
    generation: u64,
    timeout: Duration,
) -> Result<(WorkerHandle, UnboundedReceiver<WorkerEvent>), StartFailure> {
    let (handle, mut events) = worker::spawn(path, key, generation).map_err(StartFailure::Spawn)?;

    match tokio::time::timeout(timeout, events.recv()).await {
        Ok(Some(WorkerEvent::Ready)) => Ok((handle, events)),
        Ok(Some(WorkerEvent::OpenFailed(e))) => {
            handle.join().await;
            Err(StartFailure::Open(e))
        }
        Ok(Some(WorkerEvent::Exited(reason))) => Err(StartFailure::Exited(reason)),
        Ok(Some(WorkerEvent::Reply(reply))) => {
            debug!(id = reply.id, "Reply before ready");
            Err(StartFailure::Exited(ExitReason::ChannelClosed))
        }
        Ok(None) => Err(StartFailure::Exited(ExitReason::ChannelClosed)),
        // Dropping the handle closes the command channel; the thread exits once
        // it finishes opening.
        Err(_) => Err(StartFailure::Timeout(timeout)),
    }
}

/// Route one worker generation's events until it exits.
fn supervise(
    inner: Weak<Inner>,
    generation: u64,
    mut events: UnboundedReceiver<WorkerEvent>,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            match event {
                WorkerEvent::Reply(reply) => inner.deliver(reply),
                WorkerEvent::Exited(reason) => {
                    inner.handle_exit(generation, reason).await;
                    return;
                }
                WorkerEvent::Ready | WorkerEvent::OpenFailed(_) => {
                    debug!(generation, "Ignoring late startup event");
                }
            }
        }
    })
}
