//! Instructions CRUD.

use crate::error::require;
use crate::models::now;
use crate::{Instruction, SecureDatabase, StoreError, StoreResult};
use tracing::debug;
use uuid::Uuid;
use vault_database::sql_params;

const INSTRUCTION_COLUMNS: &str = "id, name, content, created_at, updated_at";

impl SecureDatabase {
    pub async fn create_instruction(&self, name: &str, content: &str) -> StoreResult<Instruction> {
        require("name", name)?;
        let id = Uuid::new_v4().to_string();
        self.db
            .run(
                "INSERT INTO instructions (id, name, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                sql_params![id.as_str(), name, content, now()],
            )
            .await?;
        debug!(instruction_id = %id, "Created instruction");
        self.require_instruction(&id).await
    }

    pub async fn get_instruction(&self, id: &str) -> StoreResult<Option<Instruction>> {
        Ok(self
            .db
            .get(
                &format!("SELECT {INSTRUCTION_COLUMNS} FROM instructions WHERE id = ?1"),
                sql_params![id],
            )
            .await?)
    }

    /// Replace the given fields; `None` keeps the current value.
    pub async fn update_instruction(
        &self,
        id: &str,
        name: Option<&str>,
        content: Option<&str>,
    ) -> StoreResult<Instruction> {
        if let Some(name) = name {
            require("name", name)?;
        }
        let result = self
            .db
            .run(
                "UPDATE instructions
                 SET name = COALESCE(?2, name), content = COALESCE(?3, content), updated_at = ?4
                 WHERE id = ?1",
                sql_params![id, name, content, now()],
            )
            .await?;
        if result.changes == 0 {
            return Err(StoreError::not_found("instruction", id));
        }
        self.require_instruction(id).await
    }

    pub async fn delete_instruction(&self, id: &str) -> StoreResult<()> {
        let result = self
            .db
            .run("DELETE FROM instructions WHERE id = ?1", sql_params![id])
            .await?;
        if result.changes == 0 {
            return Err(StoreError::not_found("instruction", id));
        }
        debug!(instruction_id = %id, "Deleted instruction");
        Ok(())
    }

    /// All instructions, oldest first.
    pub async fn list_instructions(&self) -> StoreResult<Vec<Instruction>> {
        Ok(self
            .db
            .all(
                &format!("SELECT {INSTRUCTION_COLUMNS} FROM instructions ORDER BY created_at, name"),
                sql_params![],
            )
            .await?)
    }

    async fn require_instruction(&self, id: &str) -> StoreResult<Instruction> {
        self.get_instruction(id)
            .await?
            .ok_or_else(|| StoreError::not_found("instruction", id))
    }
}
