//! Database error types.
//!
//! Driver errors never leave the worker thread as `rusqlite::Error`. They are
//! classified into an [`ErrorCause`] where they are first observed and travel
//! to the controller as a [`WorkerError`].

use rusqlite::ffi;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which constraint a failing statement violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    PrimaryKey,
    ForeignKey,
    NotNull,
    Check,
    Other,
}

/// Closed set of failure causes reported by the embedded database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCause {
    /// Another connection holds a conflicting lock.
    Busy,
    /// A table in this connection is locked.
    Locked,
    Constraint(ConstraintKind),
    /// Wrong key, or the file is not a database at all.
    NotADatabase,
    Corrupt,
    ReadOnly,
    Io,
    /// Syntax errors, missing tables or columns, type mismatches.
    Sql,
    /// Invalid use of the worker protocol, e.g. an unknown statement handle.
    Misuse,
    Other,
}

impl ErrorCause {
    /// Contention that clears up on its own.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorCause::Busy | ErrorCause::Locked)
    }

    pub fn from_sqlite(err: &rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _) => Self::from_code(e),
            // Syntax errors reported at prepare time.
            rusqlite::Error::SqlInputError { error, .. } => Self::from_code(error),
            rusqlite::Error::QueryReturnedNoRows
            | rusqlite::Error::InvalidColumnIndex(_)
            | rusqlite::Error::InvalidColumnName(_)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::InvalidParameterCount(..)
            | rusqlite::Error::InvalidParameterName(_)
            | rusqlite::Error::ExecuteReturnedResults
            | rusqlite::Error::MultipleStatement => ErrorCause::Sql,
            _ => ErrorCause::Other,
        }
    }

    fn from_code(e: &ffi::Error) -> Self {
        match e.code {
            ffi::ErrorCode::DatabaseBusy => ErrorCause::Busy,
            ffi::ErrorCode::DatabaseLocked => ErrorCause::Locked,
            ffi::ErrorCode::ConstraintViolation => {
                ErrorCause::Constraint(constraint_kind(e.extended_code))
            }
            ffi::ErrorCode::NotADatabase => ErrorCause::NotADatabase,
            ffi::ErrorCode::DatabaseCorrupt => ErrorCause::Corrupt,
            ffi::ErrorCode::ReadOnly => ErrorCause::ReadOnly,
            ffi::ErrorCode::SystemIoFailure
            | ffi::ErrorCode::DiskFull
            | ffi::ErrorCode::CannotOpen => ErrorCause::Io,
            ffi::ErrorCode::ApiMisuse => ErrorCause::Misuse,
            ffi::ErrorCode::Unknown | ffi::ErrorCode::TypeMismatch => ErrorCause::Sql,
            _ => ErrorCause::Other,
        }
    }
}

fn constraint_kind(extended_code: i32) -> ConstraintKind {
    match extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
        ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
        ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
        ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
        _ => ConstraintKind::Other,
    }
}

/// Error produced inside the worker, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WorkerError {
    pub cause: ErrorCause,
    pub message: String,
}

impl WorkerError {
    pub fn new(cause: ErrorCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for WorkerError {
    fn from(err: rusqlite::Error) -> Self {
        Self {
            cause: ErrorCause::from_sqlite(&err),
            message: err.to_string(),
        }
    }
}

/// How a worker died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerFailureKind {
    /// The worker thread stopped without being asked to.
    Terminated,
    /// A restarted worker never reported ready.
    Timeout,
    /// The worker could not (re)open the database file.
    ConnectionFailed,
    /// The worker panicked.
    Unknown,
}

impl fmt::Display for WorkerFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerFailureKind::Terminated => "terminated",
            WorkerFailureKind::Timeout => "timeout",
            WorkerFailureKind::ConnectionFailed => "connection failed",
            WorkerFailureKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// A statement failed inside the worker.
    #[error("{operation} failed: {message}")]
    Query {
        operation: &'static str,
        cause: ErrorCause,
        message: String,
    },

    /// No reply within the operation's timeout band.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The worker died while the request was pending.
    #[error("worker {kind} during {operation} (retry {retry_count}): {message}")]
    WorkerFailure {
        kind: WorkerFailureKind,
        operation: &'static str,
        retry_count: u32,
        message: String,
    },

    /// The lifetime restart ceiling was reached; the controller is unusable.
    #[error("database worker failed permanently after {restarts} restarts: {last_failure}")]
    RestartBudgetExhausted { restarts: u32, last_failure: String },

    /// A retryable error persisted through every attempt.
    #[error("{operation} gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<DatabaseError>,
    },

    #[error("database could not be opened: {0}")]
    Open(WorkerError),

    /// The key does not decrypt this file.
    #[error("database key does not match the database file")]
    KeyMismatch,

    #[error("database is closing")]
    Closing,

    #[error("database is closed")]
    Closed,

    #[error("worker did not terminate after {attempts} attempts")]
    Termination { attempts: u32 },

    /// A transaction handle was used after its scope ended.
    #[error("transaction is no longer active")]
    TransactionFinished,

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A row did not have the expected shape.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl DatabaseError {
    pub(crate) fn from_worker(operation: &'static str, err: WorkerError) -> Self {
        DatabaseError::Query {
            operation,
            cause: err.cause,
            message: err.message,
        }
    }

    /// Whether the retry policy may try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            DatabaseError::Query { cause, .. } => cause.is_transient(),
            DatabaseError::WorkerFailure { .. } => true,
            _ => false,
        }
    }

    /// The innermost error, looking through [`DatabaseError::RetriesExhausted`].
    pub fn root(&self) -> &DatabaseError {
        match self {
            DatabaseError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn cause(&self) -> Option<ErrorCause> {
        match self.root() {
            DatabaseError::Query { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self.cause() {
            Some(ErrorCause::Constraint(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        self.constraint_kind().is_some()
    }

    /// Unique or primary-key violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self.constraint_kind(),
            Some(ConstraintKind::Unique | ConstraintKind::PrimaryKey)
        )
    }
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn failure(sql: &str) -> rusqlite::Error {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE,
                             parent_id INTEGER REFERENCES parent(id));
             PRAGMA foreign_keys = ON;
             INSERT INTO t (id, name) VALUES (1, 'a');",
        )
        .unwrap();
        conn.execute_batch(sql).unwrap_err()
    }

    #[test]
    fn test_classifies_constraints() {
        assert_eq!(
            ErrorCause::from_sqlite(&failure("INSERT INTO t (id, name) VALUES (2, 'a')")),
            ErrorCause::Constraint(ConstraintKind::Unique)
        );
        assert_eq!(
            ErrorCause::from_sqlite(&failure("INSERT INTO t (id, name) VALUES (1, 'b')")),
            ErrorCause::Constraint(ConstraintKind::PrimaryKey)
        );
        assert_eq!(
            ErrorCause::from_sqlite(&failure("INSERT INTO t (id, name) VALUES (3, NULL)")),
            ErrorCause::Constraint(ConstraintKind::NotNull)
        );
        assert_eq!(
            ErrorCause::from_sqlite(&failure(
                "INSERT INTO t (id, name, parent_id) VALUES (4, 'c', 99)"
            )),
            ErrorCause::Constraint(ConstraintKind::ForeignKey)
        );
    }

    #[test]
    fn test_classifies_sql_errors_as_fatal() {
        let cause = ErrorCause::from_sqlite(&failure("SELECT * FROM missing_table"));
        assert!(!cause.is_transient());

        let err = DatabaseError::from_worker("run", WorkerError::new(cause, "no such table"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classifies_prepare_syntax_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.prepare("SELEC 1").unwrap_err();
        assert_eq!(ErrorCause::from_sqlite(&err), ErrorCause::Sql);
    }

    #[test]
    fn test_busy_and_locked_are_retryable() {
        for cause in [ErrorCause::Busy, ErrorCause::Locked] {
            let err = DatabaseError::Query {
                operation: "run",
                cause,
                message: "database is locked".into(),
            };
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_worker_failure_retryable_timeout_not() {
        let crash = DatabaseError::WorkerFailure {
            kind: WorkerFailureKind::Unknown,
            operation: "get",
            retry_count: 0,
            message: "worker exited".into(),
        };
        assert!(crash.is_retryable());

        let timeout = DatabaseError::Timeout {
            operation: "all",
            timeout: Duration::from_millis(10),
        };
        assert!(!timeout.is_retryable());
    }

    #[test]
    fn test_root_looks_through_retries() {
        let err = DatabaseError::RetriesExhausted {
            operation: "run",
            attempts: 3,
            source: Box::new(DatabaseError::Query {
                operation: "run",
                cause: ErrorCause::Busy,
                message: "database is locked".into(),
            }),
        };
        assert_eq!(err.cause(), Some(ErrorCause::Busy));
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_worker_failure_message_names_operation_and_retries() {
        let err = DatabaseError::WorkerFailure {
            kind: WorkerFailureKind::Terminated,
            operation: "stmt_run",
            retry_count: 2,
            message: "thread exited".into(),
        };
        let text = err.to_string();
        assert!(text.contains("stmt_run"));
        assert!(text.contains("retry 2"));
    }
}
