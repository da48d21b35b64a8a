//! Encrypted SQLite storage behind a dedicated worker thread.
//!
//! This crate provides:
//! - A worker thread that exclusively owns the SQLCipher connection
//! - `AsyncDatabase`, the controller callers talk to: request ids, per-class
//!   timeouts, retries with backoff, health checks, and bounded worker restarts
//! - Transactions with nested savepoints, and prepared statements
//! - Schema migrations with an audit log maintained by triggers
//! - ChaCha20-Poly1305 encryption for individual values
//!
//! # Architecture
//!
//! Every statement is sent to the worker as an `{id, method}` envelope and
//! executed in FIFO order. A crash of the worker rejects everything in flight
//! with a retryable error; the controller restarts the worker and callers'
//! retries land on the new one.
//!
//! ```ignore
//! let db = AsyncDatabase::open(&path, Some(key), DatabaseConfig::default()).await?;
//! db.run("INSERT INTO t (a) VALUES (?1)", sql_params!["x"]).await?;
//! let n: Option<i64> = db.get("SELECT COUNT(*) FROM t", sql_params![]).await?;
//! ```
//!
//! **Important**: only SQL runs on the worker. Hashing, compression and
//! encryption happen in the caller before a request is sent.

mod encryption;
mod error;
mod executor;
mod key;
mod migrations;
mod protocol;
mod retry;
mod statement;
mod transaction;
mod value;
mod worker;

#[cfg(test)]
mod tests;

pub use encryption::{
    decrypt_content, decrypt_value, encrypt_content, encrypt_value, generate_nonce, NONCE_SIZE,
};
pub use error::{
    ConstraintKind, DatabaseError, DatabaseResult, ErrorCause, WorkerError, WorkerFailureKind,
};
pub use executor::{AsyncDatabase, DatabaseConfig, DatabaseEvent, DatabaseStats, Lifecycle};
pub use key::DatabaseKey;
pub use migrations::{run_migrations, schema_version, CURRENT_VERSION};
pub use protocol::{Method, StatementId};
pub use retry::{restart_delay, OperationClass, RetryDecision, RetryPolicy, Timeouts};
pub use rusqlite::types::Value;
pub use statement::PreparedStatement;
pub use transaction::Transaction;
pub use value::{FromRow, IntoParam, Row, RunResult};
