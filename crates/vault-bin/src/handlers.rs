//! Request handlers.
//!
//! Each method validates its params, calls one `SecureDatabase` operation and
//! serializes the result. Store errors are mapped to protocol error codes;
//! responses never carry the key or the database location.

use crate::protocol::{error_codes, Method, Request, Response};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use vault_database::DatabaseError;
use vault_store::{SecureDatabase, StoreError};

const DEFAULT_AUDIT_LIMIT: u32 = 100;

#[derive(Error, Debug)]
enum HandlerError {
    #[error("{0}")]
    InvalidParams(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

type HandlerResult = Result<Value, HandlerError>;

impl HandlerError {
    fn code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::Encode(_) => error_codes::INTERNAL_ERROR,
            Self::Store(err) => match err {
                StoreError::Validation(_) => error_codes::INVALID_PARAMS,
                StoreError::NotFound { .. } => error_codes::NOT_FOUND,
                StoreError::AlreadyExists { .. } => error_codes::CONFLICT,
                StoreError::KeyMismatch | StoreError::KeyManagement(_) => error_codes::KEY_ERROR,
                StoreError::Database(db) => match db {
                    DatabaseError::Timeout { .. }
                    | DatabaseError::WorkerFailure { .. }
                    | DatabaseError::RestartBudgetExhausted { .. }
                    | DatabaseError::RetriesExhausted { .. }
                    | DatabaseError::Closing
                    | DatabaseError::Closed => error_codes::UNAVAILABLE,
                    _ => error_codes::INTERNAL_ERROR,
                },
                StoreError::Compression(_) | StoreError::Json(_) => error_codes::INTERNAL_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            // I/O errors can name files on disk.
            Self::Store(StoreError::Database(DatabaseError::Io(_))) => {
                "database I/O error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Typed access to a request's params object.
struct Params<'a>(Option<&'a Value>);

impl<'a> Params<'a> {
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.0.and_then(|p| p.get(name)).filter(|v| !v.is_null())
    }

    fn str(&self, name: &str) -> Result<&'a str, HandlerError> {
        self.opt_str(name)?
            .ok_or_else(|| HandlerError::InvalidParams(format!("missing string param '{name}'")))
    }

    fn opt_str(&self, name: &str) -> Result<Option<&'a str>, HandlerError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| HandlerError::InvalidParams(format!("param '{name}' must be a string"))),
        }
    }

    fn value(&self, name: &str) -> Result<&'a Value, HandlerError> {
        self.get(name)
            .ok_or_else(|| HandlerError::InvalidParams(format!("missing param '{name}'")))
    }

    /// JSON value, `{}` when absent.
    fn object_or_empty(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or_else(|| json!({}))
    }

    fn bool_or(&self, name: &str, default: bool) -> Result<bool, HandlerError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| HandlerError::InvalidParams(format!("param '{name}' must be a boolean"))),
        }
    }

    fn opt_i64(&self, name: &str) -> Result<Option<i64>, HandlerError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| HandlerError::InvalidParams(format!("param '{name}' must be an integer"))),
        }
    }

    /// File content from `content` (UTF-8 text) or `content_base64`.
    fn content(&self) -> Result<Vec<u8>, HandlerError> {
        if let Some(text) = self.opt_str("content")? {
            return Ok(text.as_bytes().to_vec());
        }
        let encoded = self.opt_str("content_base64")?.ok_or_else(|| {
            HandlerError::InvalidParams("missing param 'content' or 'content_base64'".to_string())
        })?;
        BASE64
            .decode(encoded)
            .map_err(|e| HandlerError::InvalidParams(format!("invalid content_base64: {e}")))
    }
}

fn to_value<T: Serialize>(value: T) -> HandlerResult {
    Ok(serde_json::to_value(value)?)
}

/// Routes requests to the store.
#[derive(Clone)]
pub struct Handlers {
    store: Arc<SecureDatabase>,
}

impl Handlers {
    pub fn new(store: Arc<SecureDatabase>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, request: Request) -> Response {
        let Some(method) = Method::parse(&request.method) else {
            return Response::error(
                &request.id,
                error_codes::METHOD_NOT_FOUND,
                &format!("Unknown method: {}", request.method),
            );
        };

        let params = Params(request.params.as_ref());
        match self.dispatch(method, &params).await {
            Ok(result) => {
                debug!(id = %request.id, method = %request.method, "Request handled");
                Response::success(&request.id, result)
            }
            Err(err) => {
                let code = err.code();
                if code == error_codes::INTERNAL_ERROR || code == error_codes::UNAVAILABLE {
                    warn!(id = %request.id, method = %request.method, code, error = %err, "Request failed");
                } else {
                    debug!(id = %request.id, method = %request.method, code, "Request rejected");
                }
                Response::error(&request.id, code, &err.message())
            }
        }
    }

    async fn dispatch(&self, method: Method, p: &Params<'_>) -> HandlerResult {
        let store = &self.store;
        match method {
            Method::Health => {
                store.database().health_check().await.map_err(StoreError::from)?;
                let stats = store.database().stats();
                Ok(json!({
                    "status": "ok",
                    "lifecycle": stats.lifecycle.as_str(),
                    "restarts": stats.restarts,
                    "pending": stats.pending,
                    "version": env!("CARGO_PKG_VERSION"),
                }))
            }

            Method::WorkspaceList => to_value(store.list_workspaces().await?),
            Method::WorkspaceCreate => to_value(
                store
                    .create_workspace(p.str("name")?, p.opt_str("folder_path")?, &p.object_or_empty("state"))
                    .await?,
            ),
            Method::WorkspaceGet => {
                let workspace = match (p.opt_str("id")?, p.opt_str("name")?) {
                    (Some(id), _) => store.get_workspace(id).await?,
                    (None, Some(name)) => store.get_workspace_by_name(name).await?,
                    (None, None) => {
                        return Err(HandlerError::InvalidParams(
                            "missing param 'id' or 'name'".to_string(),
                        ))
                    }
                };
                to_value(workspace)
            }
            Method::WorkspaceUpdate => {
                to_value(store.update_workspace(p.str("id")?, p.value("state")?).await?)
            }
            Method::WorkspaceDelete => {
                store.delete_workspace(p.str("id")?).await?;
                Ok(json!({ "deleted": true }))
            }
            Method::WorkspaceRename => {
                to_value(store.rename_workspace(p.str("id")?, p.str("name")?).await?)
            }
            Method::WorkspaceTouch => {
                store.touch_workspace(p.str("id")?).await?;
                Ok(json!({ "touched": true }))
            }
            Method::WorkspaceLoad => to_value(store.load_workspace(p.str("name")?).await?),
            Method::WorkspaceSave => to_value(
                store
                    .save_workspace(p.str("name")?, p.opt_str("folder_path")?, &p.object_or_empty("state"))
                    .await?,
            ),
            Method::WorkspaceOpenFolder => to_value(store.open_folder(p.str("folder_path")?).await?),

            Method::FileSave => {
                let content = p.content()?;
                to_value(
                    store
                        .save_file_content(
                            p.str("workspace_id")?,
                            p.str("path")?,
                            &content,
                            p.opt_i64("token_count")?,
                        )
                        .await?,
                )
            }
            Method::FileRead => {
                let path = p.str("path")?;
                let content = store
                    .get_file_content(p.str("workspace_id")?, path)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "file",
                        id: path.to_string(),
                    })?;
                Ok(encode_content(path, content))
            }
            Method::FileList => to_value(store.list_files(p.str("workspace_id")?).await?),
            Method::FileDelete => {
                store.delete_file(p.str("workspace_id")?, p.str("path")?).await?;
                Ok(json!({ "deleted": true }))
            }
            Method::FileStats => to_value(store.content_stats().await?),

            Method::PreferenceGet => {
                let key = p.str("key")?;
                let value = store.get_preference(key).await?;
                Ok(json!({ "key": key, "value": value }))
            }
            Method::PreferenceSet => {
                store
                    .set_preference(p.str("key")?, p.value("value")?, p.bool_or("encrypted", false)?)
                    .await?;
                Ok(json!({ "saved": true }))
            }
            Method::PreferenceDelete => {
                store.delete_preference(p.str("key")?).await?;
                Ok(json!({ "deleted": true }))
            }
            Method::PreferenceList => to_value(store.list_preferences().await?),

            Method::InstructionCreate => {
                to_value(store.create_instruction(p.str("name")?, p.str("content")?).await?)
            }
            Method::InstructionGet => {
                let id = p.str("id")?;
                let instruction = store
                    .get_instruction(id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "instruction",
                        id: id.to_string(),
                    })?;
                to_value(instruction)
            }
            Method::InstructionUpdate => to_value(
                store
                    .update_instruction(p.str("id")?, p.opt_str("name")?, p.opt_str("content")?)
                    .await?,
            ),
            Method::InstructionDelete => {
                store.delete_instruction(p.str("id")?).await?;
                Ok(json!({ "deleted": true }))
            }
            Method::InstructionList => to_value(store.list_instructions().await?),

            Method::AuditList => {
                let limit = match p.opt_i64("limit")? {
                    None => DEFAULT_AUDIT_LIMIT,
                    Some(n) => u32::try_from(n).map_err(|_| {
                        HandlerError::InvalidParams("param 'limit' must be a non-negative integer".to_string())
                    })?,
                };
                to_value(store.list_audit_log(limit).await?)
            }
            Method::AuditRecord => {
                to_value(store.audit_log_for(p.str("table")?, p.str("record_id")?).await?)
            }
        }
    }
}

/// Text content is returned as-is, anything else as base64.
fn encode_content(path: &str, content: Vec<u8>) -> Value {
    match String::from_utf8(content) {
        Ok(text) => json!({ "path": path, "encoding": "utf8", "content": text }),
        Err(e) => json!({
            "path": path,
            "encoding": "base64",
            "content": BASE64.encode(e.into_bytes()),
        }),
    }
}
