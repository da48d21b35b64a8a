//! Workspace operations.

use crate::error::{conflict, require};
use crate::files::prune_orphaned_blobs;
use crate::models::now;
use crate::{SecureDatabase, StoreError, StoreResult, Workspace};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;
use vault_database::{sql_params, DatabaseResult, Transaction};

const WORKSPACE_COLUMNS: &str =
    "id, name, folder_path, state, created_at, updated_at, last_accessed";

/// Suffixes tried when a folder's name is already taken by another workspace.
const MAX_NAME_SUFFIX: u32 = 1000;

impl SecureDatabase {
    /// Create a workspace. Names are unique.
    pub async fn create_workspace(
        &self,
        name: &str,
        folder_path: Option<&str>,
        state: &serde_json::Value,
    ) -> StoreResult<Workspace> {
        require("name", name)?;
        let id = Uuid::new_v4().to_string();
        let now = now();
        let state = serde_json::to_string(state)?;

        self.db
            .run(
                "INSERT INTO workspaces (id, name, folder_path, state, created_at, updated_at, last_accessed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
                sql_params![id.as_str(), name, folder_path, state, now],
            )
            .await
            .map_err(conflict("workspace", name))?;

        info!(workspace_id = %id, "Created workspace");
        self.require_workspace(&id).await
    }

    pub async fn get_workspace(&self, id: &str) -> StoreResult<Option<Workspace>> {
        Ok(self
            .db
            .get(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"),
                sql_params![id],
            )
            .await?)
    }

    pub async fn get_workspace_by_name(&self, name: &str) -> StoreResult<Option<Workspace>> {
        Ok(self
            .db
            .get(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE name = ?1"),
                sql_params![name],
            )
            .await?)
    }

    /// All workspaces, most recently accessed first.
    pub async fn list_workspaces(&self) -> StoreResult<Vec<Workspace>> {
        Ok(self
            .db
            .all(
                &format!(
                    "SELECT {WORKSPACE_COLUMNS} FROM workspaces ORDER BY last_accessed DESC, name"
                ),
                sql_params![],
            )
            .await?)
    }

    /// Replace a workspace's state.
    pub async fn update_workspace(&self, id: &str, state: &serde_json::Value) -> StoreResult<Workspace> {
        let state = serde_json::to_string(state)?;
        let result = self
            .db
            .run(
                "UPDATE workspaces SET state = ?2, updated_at = ?3 WHERE id = ?1",
                sql_params![id, state, now()],
            )
            .await?;
        if result.changes == 0 {
            return Err(StoreError::not_found("workspace", id));
        }
        self.require_workspace(id).await
    }

    pub async fn rename_workspace(&self, id: &str, new_name: &str) -> StoreResult<Workspace> {
        require("name", new_name)?;
        let result = self
            .db
            .run(
                "UPDATE workspaces SET name = ?2, updated_at = ?3 WHERE id = ?1",
                sql_params![id, new_name, now()],
            )
            .await
            .map_err(conflict("workspace", new_name))?;
        if result.changes == 0 {
            return Err(StoreError::not_found("workspace", id));
        }
        info!(workspace_id = %id, "Renamed workspace");
        self.require_workspace(id).await
    }

    /// Bump `last_accessed`.
    pub async fn touch_workspace(&self, id: &str) -> StoreResult<()> {
        let result = self
            .db
            .run(
                "UPDATE workspaces SET last_accessed = ?2 WHERE id = ?1",
                sql_params![id, now()],
            )
            .await?;
        if result.changes == 0 {
            return Err(StoreError::not_found("workspace", id));
        }
        Ok(())
    }

    /// Delete a workspace and its files. Blobs no longer referenced by any
    /// file are removed in the same transaction.
    pub async fn delete_workspace(&self, id: &str) -> StoreResult<()> {
        let (deleted, pruned) = self
            .db
            .transaction(move |tx| async move {
                let deleted = tx
                    .run("DELETE FROM workspaces WHERE id = ?1", sql_params![id])
                    .await?;
                if deleted.changes == 0 {
                    return Ok((false, 0));
                }
                let pruned = prune_orphaned_blobs(&tx).await?;
                Ok((true, pruned))
            })
            .await?;

        if !deleted {
            return Err(StoreError::not_found("workspace", id));
        }
        info!(workspace_id = %id, pruned_blobs = pruned, "Deleted workspace");
        Ok(())
    }

    /// Save under `name`: create on first save, replace state and folder after.
    pub async fn save_workspace(
        &self,
        name: &str,
        folder_path: Option<&str>,
        state: &serde_json::Value,
    ) -> StoreResult<Workspace> {
        require("name", name)?;
        let state = serde_json::to_string(state)?;
        let state = state.as_str();
        let new_id = Uuid::new_v4().to_string();
        let new_id = new_id.as_str();
        let now = now();
        let now = now.as_str();

        let id = self
            .db
            .transaction(move |tx| async move {
                let existing: Option<String> = tx
                    .get("SELECT id FROM workspaces WHERE name = ?1", sql_params![name])
                    .await?;
                match existing {
                    Some(id) => {
                        tx.run(
                            "UPDATE workspaces
                             SET state = ?2, folder_path = COALESCE(?3, folder_path), updated_at = ?4
                             WHERE id = ?1",
                            sql_params![id.as_str(), state, folder_path, now],
                        )
                        .await?;
                        Ok(id)
                    }
                    None => {
                        tx.run(
                            "INSERT INTO workspaces (id, name, folder_path, state, created_at, updated_at, last_accessed)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
                            sql_params![new_id, name, folder_path, state, now],
                        )
                        .await?;
                        Ok(new_id.to_string())
                    }
                }
            })
            .await
            .map_err(conflict("workspace", name))?;

        debug!(workspace_id = %id, "Saved workspace");
        self.require_workspace(&id).await
    }

    /// Load a workspace by name, bumping `last_accessed`.
    pub async fn load_workspace(&self, name: &str) -> StoreResult<Option<Workspace>> {
        let result = self
            .db
            .run(
                "UPDATE workspaces SET last_accessed = ?2 WHERE name = ?1",
                sql_params![name, now()],
            )
            .await?;
        if result.changes == 0 {
            return Ok(None);
        }
        self.get_workspace_by_name(name).await
    }

    /// The most recent workspace for `folder_path`, created on first open.
    ///
    /// New workspaces are named after the folder, with a ` (n)` suffix when
    /// the name is taken.
    pub async fn open_folder(&self, folder_path: &str) -> StoreResult<Workspace> {
        require("folder_path", folder_path)?;
        let base_name = folder_name(folder_path);
        let base_name = base_name.as_str();
        let new_id = Uuid::new_v4().to_string();
        let new_id = new_id.as_str();
        let now = now();
        let now = now.as_str();

        let opened = self
            .db
            .transaction(move |tx| async move {
                let existing: Option<String> = tx
                    .get(
                        "SELECT id FROM workspaces WHERE folder_path = ?1
                         ORDER BY last_accessed DESC LIMIT 1",
                        sql_params![folder_path],
                    )
                    .await?;
                if let Some(id) = existing {
                    tx.run(
                        "UPDATE workspaces SET last_accessed = ?2 WHERE id = ?1",
                        sql_params![id.as_str(), now],
                    )
                    .await?;
                    return Ok(Some((id, false)));
                }

                let Some(name) = available_name(&tx, base_name).await? else {
                    return Ok(None);
                };
                tx.run(
                    "INSERT INTO workspaces (id, name, folder_path, state, created_at, updated_at, last_accessed)
                     VALUES (?1, ?2, ?3, '{}', ?4, ?4, ?4)",
                    sql_params![new_id, name, folder_path, now],
                )
                .await?;
                Ok(Some((new_id.to_string(), true)))
            })
            .await?;

        let Some((id, created)) = opened else {
            return Err(StoreError::AlreadyExists {
                entity: "workspace",
                name: base_name.to_string(),
            });
        };
        if created {
            info!(workspace_id = %id, "Created workspace for folder");
        }
        self.require_workspace(&id).await
    }

    async fn require_workspace(&self, id: &str) -> StoreResult<Workspace> {
        self.get_workspace(id)
            .await?
            .ok_or_else(|| StoreError::not_found("workspace", id))
    }
}

fn folder_name(folder_path: &str) -> String {
    Path::new(folder_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| folder_path.to_string())
}

async fn available_name(
    tx: &Transaction,
    base: &str,
) -> DatabaseResult<Option<String>> {
    for n in 1..=MAX_NAME_SUFFIX {
        let candidate = if n == 1 {
            base.to_string()
        } else {
            format!("{base} ({n})")
        };
        let taken: Option<i64> = tx
            .get(
                "SELECT 1 FROM workspaces WHERE name = ?1",
                sql_params![candidate.as_str()],
            )
            .await?;
        if taken.is_none() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}
