//! Messages exchanged between the controller and the worker thread.
//!
//! The controller sends `{id, method}` envelopes; the worker answers each one
//! with exactly one `{id, result}` reply. Replies may arrive after the
//! controller stopped waiting for them and are then discarded.

use crate::retry::OperationClass;
use crate::value::{Row, RunResult};
use crate::{DatabaseError, DatabaseResult, WorkerError};
use rusqlite::types::Value;
use tokio::sync::oneshot;

/// Correlation id of one request.
pub type RequestId = u64;

/// Handle of a statement prepared inside one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId(pub(crate) u64);

/// One embedded-database operation.
#[derive(Debug, Clone)]
pub enum Method {
    Run { sql: String, params: Vec<Value> },
    Get { sql: String, params: Vec<Value> },
    All { sql: String, params: Vec<Value> },
    Exec { sql: String },
    Prepare { sql: String },
    StmtRun { handle: StatementId, params: Vec<Value> },
    StmtGet { handle: StatementId, params: Vec<Value> },
    StmtAll { handle: StatementId, params: Vec<Value> },
    StmtFinalize { handle: StatementId },
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Run { .. } => "run",
            Method::Get { .. } => "get",
            Method::All { .. } => "all",
            Method::Exec { .. } => "exec",
            Method::Prepare { .. } => "prepare",
            Method::StmtRun { .. } => "stmt_run",
            Method::StmtGet { .. } => "stmt_get",
            Method::StmtAll { .. } => "stmt_all",
            Method::StmtFinalize { .. } => "stmt_finalize",
        }
    }

    /// Timeout band and retry budget this method falls under.
    pub fn class(&self) -> OperationClass {
        match self {
            Method::Get { .. } | Method::StmtGet { .. } => OperationClass::Read,
            Method::Prepare { .. } | Method::StmtFinalize { .. } => OperationClass::Read,
            Method::All { .. } | Method::StmtAll { .. } => OperationClass::BulkRead,
            Method::Run { .. } | Method::StmtRun { .. } => OperationClass::Write,
            Method::Exec { .. } => OperationClass::Schema,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: RequestId,
    pub method: Method,
}

/// Successful outcome of a [`Method`].
#[derive(Debug, Clone)]
pub enum WorkerResult {
    Run(RunResult),
    Row(Option<Row>),
    Rows(Vec<Row>),
    Done,
    Prepared(StatementId),
}

impl WorkerResult {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            WorkerResult::Run(_) => "run",
            WorkerResult::Row(_) => "row",
            WorkerResult::Rows(_) => "rows",
            WorkerResult::Done => "done",
            WorkerResult::Prepared(_) => "prepared",
        }
    }
}

#[derive(Debug)]
pub struct Reply {
    pub id: RequestId,
    pub result: Result<WorkerResult, WorkerError>,
}

/// Controller to worker.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Execute(Envelope),
    /// Close the connection, acknowledge, and exit.
    Shutdown(oneshot::Sender<()>),
    /// Panic the worker thread.
    #[cfg(test)]
    Crash,
}

/// Why a worker thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExitReason {
    Shutdown,
    ChannelClosed,
    OpenFailed,
    Panicked,
}

impl ExitReason {
    pub(crate) fn code(&self) -> i32 {
        match self {
            ExitReason::Shutdown | ExitReason::ChannelClosed => 0,
            ExitReason::OpenFailed => 2,
            ExitReason::Panicked => 101,
        }
    }
}

/// Worker to controller.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Ready,
    OpenFailed(WorkerError),
    Reply(Reply),
    Exited(ExitReason),
}

fn unexpected(operation: &'static str, result: &WorkerResult) -> DatabaseError {
    DatabaseError::InvalidData(format!(
        "unexpected {} reply to {operation}",
        result.kind()
    ))
}

impl WorkerResult {
    pub(crate) fn into_run(self, operation: &'static str) -> DatabaseResult<RunResult> {
        match self {
            WorkerResult::Run(result) => Ok(result),
            other => Err(unexpected(operation, &other)),
        }
    }

    pub(crate) fn into_row(self, operation: &'static str) -> DatabaseResult<Option<Row>> {
        match self {
            WorkerResult::Row(row) => Ok(row),
            other => Err(unexpected(operation, &other)),
        }
    }

    pub(crate) fn into_rows(self, operation: &'static str) -> DatabaseResult<Vec<Row>> {
        match self {
            WorkerResult::Rows(rows) => Ok(rows),
            other => Err(unexpected(operation, &other)),
        }
    }

    pub(crate) fn into_done(self, operation: &'static str) -> DatabaseResult<()> {
        match self {
            WorkerResult::Done => Ok(()),
            other => Err(unexpected(operation, &other)),
        }
    }

    pub(crate) fn into_statement(
        self,
        operation: &'static str,
    ) -> DatabaseResult<StatementId> {
        match self {
            WorkerResult::Prepared(handle) => Ok(handle),
            other => Err(unexpected(operation, &other)),
        }
    }
}
