//! The worker thread: sole owner of the SQLite connection.
//!
//! Commands arrive over a std channel and are executed strictly one at a time.
//! Everything the worker reports (readiness, replies, its own exit) goes back
//! over a single event channel so the controller observes them in order.

use crate::protocol::{
    Envelope, ExitReason, Method, Reply, StatementId, WorkerCommand, WorkerEvent, WorkerResult,
};
use crate::value::{Row, RunResult};
use crate::{migrations, DatabaseKey, ErrorCause, WorkerError};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Statement};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Pragmas applied after the key is verified.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA cache_size = -64000;
    PRAGMA temp_store = MEMORY;
    PRAGMA busy_timeout = 5000;
";

/// Controller-side handle on one worker thread.
pub(crate) struct WorkerHandle {
    generation: u64,
    commands: mpsc::Sender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a command. Fails once the worker thread is gone.
    pub(crate) fn send(&self, command: WorkerCommand) -> Result<(), WorkerCommand> {
        self.commands.send(command).map_err(|e| e.0)
    }

    /// Join the thread, off the async runtime.
    pub(crate) async fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let generation = self.generation;
            drop(self);
            if tokio::task::spawn_blocking(move || thread.join()).await.is_err() {
                warn!(generation, "Failed to join database worker thread");
            }
        }
    }
}

/// Start worker `generation` for the database at `path`.
pub(crate) fn spawn(
    path: PathBuf,
    key: Option<DatabaseKey>,
    generation: u64,
) -> std::io::Result<(WorkerHandle, UnboundedReceiver<WorkerEvent>)> {
    let (command_tx, command_rx) = mpsc::channel();
    let (event_tx, event_rx) = unbounded_channel();

    let thread = std::thread::Builder::new()
        .name(format!("db-worker-{generation}"))
        .spawn(move || run(path, key, command_rx, event_tx, generation))?;

    Ok((
        WorkerHandle {
            generation,
            commands: command_tx,
            thread: Some(thread),
        },
        event_rx,
    ))
}

/// Owns the command channel and reports the worker's exit, including exits
/// by panic.
struct ExitGuard {
    commands: Option<mpsc::Receiver<WorkerCommand>>,
    events: UnboundedSender<WorkerEvent>,
    reason: ExitReason,
}

impl ExitGuard {
    fn recv(&self) -> Option<WorkerCommand> {
        self.commands.as_ref()?.recv().ok()
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        // Sends made after the exit event must fail, not queue.
        drop(self.commands.take());
        let reason = if std::thread::panicking() {
            ExitReason::Panicked
        } else {
            self.reason.clone()
        };
        let _ = self.events.send(WorkerEvent::Exited(reason));
    }
}

fn run(
    path: PathBuf,
    key: Option<DatabaseKey>,
    commands: mpsc::Receiver<WorkerCommand>,
    events: UnboundedSender<WorkerEvent>,
    generation: u64,
) {
    let mut guard = ExitGuard {
        commands: Some(commands),
        events: events.clone(),
        reason: ExitReason::ChannelClosed,
    };

    let conn = match open_connection(&path, key.as_ref()) {
        Ok(conn) => conn,
        Err(e) => {
            error!(generation, cause = ?e.cause, error = %e, "Database worker failed to open connection");
            guard.reason = ExitReason::OpenFailed;
            let _ = events.send(WorkerEvent::OpenFailed(e));
            return;
        }
    };

    info!(generation, "Database worker ready");
    let _ = events.send(WorkerEvent::Ready);

    let mut state = WorkerState::new(conn);
    while let Some(command) = guard.recv() {
        match command {
            WorkerCommand::Execute(Envelope { id, method }) => {
                let result = state.execute(method);
                if events.send(WorkerEvent::Reply(Reply { id, result })).is_err() {
                    debug!(generation, id, "Controller gone, dropping reply");
                }
            }
            WorkerCommand::Shutdown(ack) => {
                state.close();
                guard.reason = ExitReason::Shutdown;
                let _ = ack.send(());
                info!(generation, "Database worker shut down");
                return;
            }
            #[cfg(test)]
            WorkerCommand::Crash => panic!("injected database worker crash"),
        }
    }

    debug!(generation, "Command channel closed, database worker exiting");
}

/// Open, unlock, verify and migrate the database file.
fn open_connection(path: &Path, key: Option<&DatabaseKey>) -> Result<Connection, WorkerError> {
    let conn = Connection::open(path)?;

    if let Some(key) = key {
        conn.execute_batch(&format!("PRAGMA key = {};", key.pragma_literal()))?;
    }

    // Fails with NotADatabase when the key does not match the file.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })?;

    conn.execute_batch(CONNECTION_PRAGMAS)?;

    migrations::run_migrations(&conn)
        .map_err(|e| WorkerError::new(ErrorCause::Other, e.to_string()))?;

    Ok(conn)
}

struct WorkerState {
    conn: Option<Connection>,
    statements: HashMap<u64, String>,
    next_handle: u64,
}

impl WorkerState {
    fn new(conn: Connection) -> Self {
        Self {
            conn: Some(conn),
            statements: HashMap::new(),
            next_handle: 1,
        }
    }

    fn conn(&self) -> Result<&Connection, WorkerError> {
        self.conn
            .as_ref()
            .ok_or_else(|| WorkerError::new(ErrorCause::Misuse, "connection is closed"))
    }

    fn execute(&mut self, method: Method) -> Result<WorkerResult, WorkerError> {
        match method {
            Method::Run { sql, params } => {
                let mut stmt = self.conn()?.prepare_cached(&sql)?;
                self.run(&mut stmt, params)
            }
            Method::Get { sql, params } => {
                let mut stmt = self.conn()?.prepare_cached(&sql)?;
                query_one(&mut stmt, params).map(WorkerResult::Row)
            }
            Method::All { sql, params } => {
                let mut stmt = self.conn()?.prepare_cached(&sql)?;
                query_all(&mut stmt, params).map(WorkerResult::Rows)
            }
            Method::Exec { sql } => {
                self.conn()?.execute_batch(&sql)?;
                Ok(WorkerResult::Done)
            }
            Method::Prepare { sql } => {
                // Compile now so syntax errors surface at prepare time.
                self.conn()?.prepare_cached(&sql)?;
                let handle = self.next_handle;
                self.next_handle += 1;
                self.statements.insert(handle, sql);
                Ok(WorkerResult::Prepared(StatementId(handle)))
            }
            Method::StmtRun { handle, params } => {
                let sql = self.statement_sql(handle)?;
                let mut stmt = self.conn()?.prepare_cached(&sql)?;
                self.run(&mut stmt, params)
            }
            Method::StmtGet { handle, params } => {
                let sql = self.statement_sql(handle)?;
                let mut stmt = self.conn()?.prepare_cached(&sql)?;
                query_one(&mut stmt, params).map(WorkerResult::Row)
            }
            Method::StmtAll { handle, params } => {
                let sql = self.statement_sql(handle)?;
                let mut stmt = self.conn()?.prepare_cached(&sql)?;
                query_all(&mut stmt, params).map(WorkerResult::Rows)
            }
            Method::StmtFinalize { handle } => {
                if self.statements.remove(&handle.0).is_none() {
                    return Err(unknown_statement(handle));
                }
                Ok(WorkerResult::Done)
            }
        }
    }

    fn statement_sql(&self, handle: StatementId) -> Result<String, WorkerError> {
        self.statements
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| unknown_statement(handle))
    }

    fn run(&self, stmt: &mut Statement<'_>, params: Vec<Value>) -> Result<WorkerResult, WorkerError> {
        let changes = stmt.execute(params_from_iter(params))?;
        Ok(WorkerResult::Run(RunResult {
            changes,
            last_insert_id: self.conn()?.last_insert_rowid(),
        }))
    }

    fn close(&mut self) {
        self.statements.clear();
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "Error closing database connection");
            }
        }
    }
}

fn unknown_statement(handle: StatementId) -> WorkerError {
    WorkerError::new(
        ErrorCause::Misuse,
        format!("unknown prepared statement handle {}", handle.0),
    )
}

fn column_names(stmt: &Statement<'_>) -> Arc<Vec<String>> {
    Arc::new(stmt.column_names().into_iter().map(String::from).collect())
}

fn read_row(row: &rusqlite::Row<'_>, columns: &Arc<Vec<String>>) -> rusqlite::Result<Row> {
    let values = (0..columns.len())
        .map(|i| row.get::<_, Value>(i))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Row::new(Arc::clone(columns), values))
}

fn query_one(stmt: &mut Statement<'_>, params: Vec<Value>) -> Result<Option<Row>, WorkerError> {
    let columns = column_names(stmt);
    let mut rows = stmt.query(params_from_iter(params))?;
    match rows.next()? {
        Some(row) => Ok(Some(read_row(row, &columns)?)),
        None => Ok(None),
    }
}

fn query_all(stmt: &mut Statement<'_>, params: Vec<Value>) -> Result<Vec<Row>, WorkerError> {
    let columns = column_names(stmt);
    let rows = stmt
        .query_map(params_from_iter(params), |row| read_row(row, &columns))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
