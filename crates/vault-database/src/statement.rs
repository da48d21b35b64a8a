//! Prepared statements that outlive worker restarts.

use crate::executor::AsyncDatabase;
use crate::protocol::{Envelope, Method, StatementId, WorkerCommand, WorkerResult};
use crate::retry::OperationClass;
use crate::value::{FromRow, RunResult};
use crate::DatabaseResult;
use rusqlite::types::Value;
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

/// A statement compiled once and executed many times.
///
/// Handles are tied to one worker generation. When the worker has been
/// replaced since the last use, the statement is prepared again on the new
/// worker before executing. Not usable inside a transaction body.
pub struct PreparedStatement {
    db: AsyncDatabase,
    sql: String,
    handle: Mutex<Option<(u64, StatementId)>>,
}

impl fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

impl PreparedStatement {
    pub(crate) async fn new(db: AsyncDatabase, sql: &str) -> DatabaseResult<Self> {
        let statement = Self {
            db,
            sql: sql.to_string(),
            handle: Mutex::new(None),
        };
        {
            let _shared = statement.db.inner.gate.read().await;
            statement
                .db
                .inner
                .with_retry("prepare", OperationClass::Read, |_| statement.handle())
                .await?;
        }
        Ok(statement)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub async fn run(&self, params: Vec<Value>) -> DatabaseResult<RunResult> {
        self.execute(params, |handle, params| Method::StmtRun { handle, params })
            .await?
            .into_run("stmt_run")
    }

    pub async fn get<T: FromRow>(&self, params: Vec<Value>) -> DatabaseResult<Option<T>> {
        let row = self
            .execute(params, |handle, params| Method::StmtGet { handle, params })
            .await?
            .into_row("stmt_get")?;
        row.as_ref().map(T::from_row).transpose()
    }

    pub async fn all<T: FromRow>(&self, params: Vec<Value>) -> DatabaseResult<Vec<T>> {
        self.execute(params, |handle, params| Method::StmtAll { handle, params })
            .await?
            .into_rows("stmt_all")?
            .iter()
            .map(T::from_row)
            .collect()
    }

    /// Release the statement in the worker.
    pub async fn finalize(self) -> DatabaseResult<()> {
        let handle = self.handle.lock().await.take();
        if let Some((generation, handle)) = handle {
            if generation == self.db.inner.current_generation() {
                self.db
                    .inner
                    .dispatch(Method::StmtFinalize { handle }, 0)
                    .await?
                    .into_done("stmt_finalize")?;
            }
        }
        Ok(())
    }

    async fn execute<B>(&self, params: Vec<Value>, build: B) -> DatabaseResult<WorkerResult>
    where
        B: Fn(StatementId, Vec<Value>) -> Method,
    {
        let probe = build(StatementId(0), Vec::new());
        let (operation, class) = (probe.name(), probe.class());

        let inner = &*self.db.inner;
        let _shared = inner.gate.read().await;
        let build = &build;
        let params = &params;
        inner
            .with_retry(operation, class, |retry| async move {
                let handle = self.handle().await?;
                inner.dispatch(build(handle, params.clone()), retry).await
            })
            .await
    }

    /// Handle valid for the current worker, preparing it if needed.
    async fn handle(&self) -> DatabaseResult<StatementId> {
        let generation = self.db.inner.current_generation();
        let mut slot = self.handle.lock().await;
        if let Some((prepared_in, handle)) = *slot {
            if prepared_in == generation {
                return Ok(handle);
            }
            debug!(prepared_in, generation, "Re-preparing statement on restarted worker");
        }
        let handle = self
            .db
            .inner
            .dispatch(
                Method::Prepare {
                    sql: self.sql.clone(),
                },
                0,
            )
            .await?
            .into_statement("prepare")?;
        *slot = Some((generation, handle));
        Ok(handle)
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        let Some((generation, handle)) = self.handle.get_mut().take() else {
            return;
        };
        let inner = &self.db.inner;
        if generation != inner.current_generation() {
            return;
        }
        // Fire and forget; the reply has no pending entry and is discarded.
        inner.send_untracked(WorkerCommand::Execute(Envelope {
            id: 0,
            method: Method::StmtFinalize { handle },
        }));
    }
}
