//! Transactions and savepoints.
//!
//! A transaction holds the controller's gate exclusively from `BEGIN` to
//! `COMMIT`, so statements from other callers never interleave with it.
//! Statements inside the body go through the [`Transaction`] handle; calling
//! the [`AsyncDatabase`] directly from inside a body would wait on the gate
//! forever.

use crate::executor::{AsyncDatabase, Inner};
use crate::protocol::{Envelope, Method, WorkerCommand, WorkerResult};
use crate::retry::{OperationClass, RetryDecision};
use crate::value::{FromRow, RunResult};
use crate::{DatabaseError, DatabaseResult};
use rusqlite::types::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLockWriteGuard;
use tracing::{debug, warn};

/// Statement handle scoped to one transaction or savepoint.
///
/// Statements are never retried individually; a transient failure fails the
/// body and the whole transaction is retried.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
    depth: u32,
    savepoints: Arc<AtomicU32>,
    active: Arc<AtomicBool>,
    retry_count: u32,
}

impl Transaction {
    fn begin(inner: Arc<Inner>, retry_count: u32) -> Self {
        Self {
            inner,
            depth: 0,
            savepoints: Arc::new(AtomicU32::new(0)),
            active: Arc::new(AtomicBool::new(true)),
            retry_count,
        }
    }

    /// 0 for the outer transaction, +1 per enclosing savepoint.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub async fn run(&self, sql: &str, params: Vec<Value>) -> DatabaseResult<RunResult> {
        self.dispatch(Method::Run {
            sql: sql.to_string(),
            params,
        })
        .await?
        .into_run("run")
    }

    pub async fn get<T: FromRow>(&self, sql: &str, params: Vec<Value>) -> DatabaseResult<Option<T>> {
        let row = self
            .dispatch(Method::Get {
                sql: sql.to_string(),
                params,
            })
            .await?
            .into_row("get")?;
        row.as_ref().map(T::from_row).transpose()
    }

    pub async fn all<T: FromRow>(&self, sql: &str, params: Vec<Value>) -> DatabaseResult<Vec<T>> {
        self.dispatch(Method::All {
            sql: sql.to_string(),
            params,
        })
        .await?
        .into_rows("all")?
        .iter()
        .map(T::from_row)
        .collect()
    }

    pub async fn exec(&self, sql: &str) -> DatabaseResult<()> {
        self.dispatch(Method::Exec {
            sql: sql.to_string(),
        })
        .await?
        .into_done("exec")
    }

    /// Run `body` inside a savepoint.
    ///
    /// On success the savepoint is released. On error only the savepoint's
    /// changes are rolled back and the error is returned, leaving the
    /// enclosing transaction usable.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> DatabaseResult<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = DatabaseResult<T>>,
    {
        self.ensure_active()?;
        let name = format!("sp_{}", self.savepoints.fetch_add(1, Ordering::SeqCst) + 1);
        self.exec(&format!("SAVEPOINT {name}")).await?;

        let nested = Transaction {
            inner: Arc::clone(&self.inner),
            depth: self.depth + 1,
            savepoints: Arc::clone(&self.savepoints),
            active: Arc::new(AtomicBool::new(true)),
            retry_count: self.retry_count,
        };
        let result = body(nested.clone()).await;
        nested.active.store(false, Ordering::SeqCst);

        match result {
            Ok(value) => {
                self.exec(&format!("RELEASE {name}")).await?;
                Ok(value)
            }
            Err(e) => {
                debug!(savepoint = %name, depth = nested.depth, error = %e, "Rolling back savepoint");
                if let Err(rollback) = self
                    .exec(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                    .await
                {
                    warn!(savepoint = %name, error = %rollback, "Savepoint rollback failed");
                }
                Err(e)
            }
        }
    }

    fn ensure_active(&self) -> DatabaseResult<()> {
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DatabaseError::TransactionFinished)
        }
    }

    async fn dispatch(&self, method: Method) -> DatabaseResult<WorkerResult> {
        self.ensure_active()?;
        self.inner.dispatch(method, self.retry_count).await
    }
}

impl AsyncDatabase {
    /// Run `body` atomically.
    ///
    /// Commits when `body` returns `Ok` and rolls back otherwise. When a
    /// retryable failure aborts the attempt (lock contention, a worker crash)
    /// the whole body runs again from `BEGIN`, up to the transaction retry
    /// budget, so `body` must be safe to re-run.
    pub async fn transaction<T, F, Fut>(&self, mut body: F) -> DatabaseResult<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = DatabaseResult<T>>,
    {
        let policy = self.inner.config.retry;
        let mut attempt = 1;
        loop {
            let err = match self.transaction_once(&mut body, attempt - 1).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            match policy.decide(&err, attempt, OperationClass::Transaction) {
                RetryDecision::Retry(delay) => {
                    debug!(attempt, ?delay, error = %err, "Retrying transaction");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Exhausted => {
                    warn!(attempts = attempt, error = %err, "Transaction retries exhausted");
                    return Err(DatabaseError::RetriesExhausted {
                        operation: "transaction",
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                RetryDecision::Fatal => return Err(err),
            }
        }
    }

    async fn transaction_once<T, F, Fut>(&self, body: &mut F, retry_count: u32) -> DatabaseResult<T>
    where
        F: FnMut(Transaction) -> Fut,
        Fut: Future<Output = DatabaseResult<T>>,
    {
        let inner = &self.inner;
        let exclusive = inner.gate.write().await;
        inner.wait_ready().await?;

        let tx = Transaction::begin(Arc::clone(inner), retry_count);
        let mut guard = OpenTransaction {
            inner,
            active: Arc::clone(&tx.active),
            finished: false,
            _exclusive: exclusive,
        };

        if let Err(e) = inner
            .dispatch(
                Method::Exec {
                    sql: "BEGIN IMMEDIATE".to_string(),
                },
                retry_count,
            )
            .await
        {
            guard.finished = true;
            return Err(e);
        }

        let result = body(tx.clone()).await;
        tx.active.store(false, Ordering::SeqCst);

        let outcome = match result {
            Ok(value) => match self.finish(inner, "COMMIT", retry_count).await {
                Ok(()) => {
                    guard.finished = true;
                    return Ok(value);
                }
                Err(e) => e,
            },
            Err(e) => e,
        };

        if let Err(rollback) = self.finish(inner, "ROLLBACK", retry_count).await {
            debug!(error = %rollback, "Rollback after failed transaction did not apply");
        }
        guard.finished = true;
        Err(outcome)
    }

    async fn finish(&self, inner: &Inner, sql: &str, retry_count: u32) -> DatabaseResult<()> {
        inner
            .dispatch(
                Method::Exec {
                    sql: sql.to_string(),
                },
                retry_count,
            )
            .await?
            .into_done("exec")
    }
}

/// Holds the write gate from `BEGIN` until the transaction is finished.
///
/// Dropped unfinished means the caller stopped polling mid-transaction. The
/// `ROLLBACK` is queued before the gate is released, so the worker runs it
/// ahead of any statement from another caller.
struct OpenTransaction<'a> {
    inner: &'a Inner,
    active: Arc<AtomicBool>,
    finished: bool,
    _exclusive: RwLockWriteGuard<'a, ()>,
}

impl Drop for OpenTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.active.store(false, Ordering::SeqCst);
        warn!("Transaction abandoned before completion, rolling back");
        self.inner.send_untracked(WorkerCommand::Execute(Envelope {
            id: 0,
            method: Method::Exec {
                sql: "ROLLBACK".to_string(),
            },
        }));
    }
}
