//! Store error types.

use thiserror::Error;
use vault_database::DatabaseError;
use vault_keyring::KeyError;

/// Store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Input rejected before reaching the database.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint rejected the write; nothing was stored.
    #[error("{entity} already exists: {name}")]
    AlreadyExists { entity: &'static str, name: String },

    /// The key from the secret store does not unlock the database file.
    #[error("database key does not match the database file")]
    KeyMismatch,

    #[error("Key management error: {0}")]
    KeyManagement(#[from] KeyError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Compression error: {0}")]
    Compression(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Turn a unique-constraint failure into [`StoreError::AlreadyExists`].
pub(crate) fn conflict<'a>(
    entity: &'static str,
    name: &'a str,
) -> impl FnOnce(DatabaseError) -> StoreError + 'a {
    move |err| {
        if err.is_unique_violation() {
            StoreError::AlreadyExists {
                entity,
                name: name.to_string(),
            }
        } else {
            StoreError::Database(err)
        }
    }
}

/// Reject empty or whitespace-only identifiers.
pub(crate) fn require(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
