//! Request/response contract.
//!
//! JSON-RPC-like envelopes, one per line in `serve` mode. Method names map
//! 1:1 onto `SecureDatabase` operations.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "health")]
    Health,

    // Workspaces
    #[serde(rename = "workspace.list")]
    WorkspaceList,
    #[serde(rename = "workspace.create")]
    WorkspaceCreate,
    #[serde(rename = "workspace.get")]
    WorkspaceGet,
    #[serde(rename = "workspace.update")]
    WorkspaceUpdate,
    #[serde(rename = "workspace.delete")]
    WorkspaceDelete,
    #[serde(rename = "workspace.rename")]
    WorkspaceRename,
    #[serde(rename = "workspace.touch")]
    WorkspaceTouch,
    #[serde(rename = "workspace.load")]
    WorkspaceLoad,
    #[serde(rename = "workspace.save")]
    WorkspaceSave,
    #[serde(rename = "workspace.open_folder")]
    WorkspaceOpenFolder,

    // Files
    #[serde(rename = "file.save")]
    FileSave,
    #[serde(rename = "file.read")]
    FileRead,
    #[serde(rename = "file.list")]
    FileList,
    #[serde(rename = "file.delete")]
    FileDelete,
    #[serde(rename = "file.stats")]
    FileStats,

    // Preferences
    #[serde(rename = "preference.get")]
    PreferenceGet,
    #[serde(rename = "preference.set")]
    PreferenceSet,
    #[serde(rename = "preference.delete")]
    PreferenceDelete,
    #[serde(rename = "preference.list")]
    PreferenceList,

    // Instructions
    #[serde(rename = "instruction.create")]
    InstructionCreate,
    #[serde(rename = "instruction.get")]
    InstructionGet,
    #[serde(rename = "instruction.update")]
    InstructionUpdate,
    #[serde(rename = "instruction.delete")]
    InstructionDelete,
    #[serde(rename = "instruction.list")]
    InstructionList,

    // Audit log
    #[serde(rename = "audit.list")]
    AuditList,
    #[serde(rename = "audit.record")]
    AuditRecord,
}

impl Method {
    /// Look up a method by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }
}

/// An incoming request. `method` stays a string so an unknown method can
/// still be answered under the caller's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method: method.to_string(),
            params,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i32,
    pub message: String,
}

impl Response {
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_FOUND: i32 = -32002;
    pub const CONFLICT: i32 = -32003;
    /// The secret store or the stored key cannot unlock the database.
    pub const KEY_ERROR: i32 = -32004;
    /// Retries or worker restarts were exhausted; the caller may try later.
    pub const UNAVAILABLE: i32 = -32005;
}
