//! Retry decisions and backoff.

use crate::DatabaseError;
use std::time::Duration;

/// Groups operations that share a timeout band and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Read,
    Write,
    BulkRead,
    Schema,
    /// A whole transaction, retried as a unit.
    Transaction,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Read => "read",
            OperationClass::Write => "write",
            OperationClass::BulkRead => "bulk_read",
            OperationClass::Schema => "schema",
            OperationClass::Transaction => "transaction",
        }
    }
}

/// Per-class request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
    pub bulk_read: Duration,
    pub schema: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(15),
            write: Duration::from_secs(30),
            bulk_read: Duration::from_secs(45),
            schema: Duration::from_secs(60),
        }
    }
}

impl Timeouts {
    pub fn for_class(&self, class: OperationClass) -> Duration {
        match class {
            OperationClass::Read => self.read,
            OperationClass::Write | OperationClass::Transaction => self.write,
            OperationClass::BulkRead => self.bulk_read,
            OperationClass::Schema => self.schema,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again.
    Retry(Duration),
    /// Retryable, but the attempt budget is spent.
    Exhausted,
    /// Not retryable.
    Fatal,
}

/// Bounded exponential backoff over retryable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first, for statements.
    pub max_attempts: u32,
    /// Total attempts for whole transactions.
    pub max_transaction_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_transaction_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            max_transaction_attempts: 1,
            ..Self::default()
        }
    }

    pub fn attempts_for(&self, class: OperationClass) -> u32 {
        match class {
            OperationClass::Transaction => self.max_transaction_attempts.max(1),
            _ => self.max_attempts.max(1),
        }
    }

    /// Decide after `attempt` (1-based) failed with `err`.
    pub fn decide(&self, err: &DatabaseError, attempt: u32, class: OperationClass) -> RetryDecision {
        if !err.is_retryable() {
            return RetryDecision::Fatal;
        }
        if attempt >= self.attempts_for(class) {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry(self.backoff(attempt))
    }

    /// `base * 2^(retry - 1)`, capped at `max_delay`; zero for `retry == 0`.
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let multiplier = 1u64.checked_shl(retry - 1).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
    }
}

/// Delay before restart number `restart` (1-based): grows linearly, capped.
pub fn restart_delay(restart: u32, base: Duration, max: Duration) -> Duration {
    base.saturating_mul(restart.max(1)).min(max)
}
