//! Content-addressed file storage.
//!
//! Content is stored once per SHA-256 digest, zstd-compressed, in
//! `file_contents`. A `files` row only references the digest. Blobs that no
//! file references any more are deleted in the transaction that orphaned them.

use crate::error::require;
use crate::models::now;
use crate::{ContentStats, FileRecord, SecureDatabase, StoreError, StoreResult};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use vault_database::{sql_params, DatabaseResult, Transaction};

const COMPRESSION_LEVEL: i32 = 3;

/// Bytes inspected for NUL when classifying content as binary.
const BINARY_SNIFF_LEN: usize = 8192;

const FILE_COLUMNS: &str = "workspace_id, path, size, is_binary, token_count, content_hash, updated_at";

/// Hex SHA-256 of the raw bytes.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Content with a NUL byte near the start is treated as binary.
pub fn is_binary(content: &[u8]) -> bool {
    content[..content.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

/// A compressed blob ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlob {
    pub hash: String,
    pub compressed: Vec<u8>,
    pub original_size: i64,
    pub compressed_size: i64,
    /// `compressed_size / original_size`, 1.0 for empty content.
    pub ratio: f64,
}

impl ContentBlob {
    pub fn encode(content: &[u8]) -> StoreResult<Self> {
        let compressed = zstd::encode_all(content, COMPRESSION_LEVEL)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        let original_size = len_i64(content.len());
        let compressed_size = len_i64(compressed.len());
        let ratio = if original_size == 0 {
            1.0
        } else {
            compressed_size as f64 / original_size as f64
        };
        Ok(Self {
            hash: content_hash(content),
            compressed,
            original_size,
            compressed_size,
            ratio,
        })
    }

    pub fn decode(compressed: &[u8]) -> StoreResult<Vec<u8>> {
        zstd::decode_all(compressed).map_err(|e| StoreError::Compression(e.to_string()))
    }
}

fn len_i64(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

/// Delete blobs no file references. Returns how many were removed.
pub(crate) async fn prune_orphaned_blobs(tx: &Transaction) -> DatabaseResult<usize> {
    let result = tx
        .run(
            "DELETE FROM file_contents
             WHERE NOT EXISTS (SELECT 1 FROM files WHERE files.content_hash = file_contents.hash)",
            sql_params![],
        )
        .await?;
    Ok(result.changes)
}

impl SecureDatabase {
    /// Store `content` at `path` in a workspace.
    ///
    /// Identical content is stored once, whatever the path or workspace. The
    /// blob previously referenced by the path is dropped if nothing else
    /// uses it.
    pub async fn save_file_content(
        &self,
        workspace_id: &str,
        path: &str,
        content: &[u8],
        token_count: Option<i64>,
    ) -> StoreResult<FileRecord> {
        require("workspace_id", workspace_id)?;
        require("path", path)?;

        let blob = ContentBlob::encode(content)?;
        let blob = &blob;
        let binary = is_binary(content);
        let now = now();
        let now = now.as_str();

        let outcome = self
            .db
            .transaction(move |tx| async move {
                let exists: Option<i64> = tx
                    .get("SELECT 1 FROM workspaces WHERE id = ?1", sql_params![workspace_id])
                    .await?;
                if exists.is_none() {
                    return Ok(None);
                }

                let stored = tx
                    .run(
                        "INSERT OR IGNORE INTO file_contents
                             (hash, compressed_content, original_size, compressed_size, compression_ratio)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        sql_params![
                            blob.hash.as_str(),
                            blob.compressed.as_slice(),
                            blob.original_size,
                            blob.compressed_size,
                            blob.ratio,
                        ],
                    )
                    .await?;

                tx.run(
                    "INSERT INTO files (workspace_id, path, size, is_binary, token_count, content_hash, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(workspace_id, path) DO UPDATE SET
                         size = excluded.size,
                         is_binary = excluded.is_binary,
                         token_count = excluded.token_count,
                         content_hash = excluded.content_hash,
                         updated_at = excluded.updated_at",
                    sql_params![
                        workspace_id,
                        path,
                        blob.original_size,
                        binary,
                        token_count,
                        blob.hash.as_str(),
                        now,
                    ],
                )
                .await?;

                let pruned = prune_orphaned_blobs(&tx).await?;
                Ok(Some((stored.changes > 0, pruned)))
            })
            .await?;

        let Some((new_blob, pruned)) = outcome else {
            return Err(StoreError::not_found("workspace", workspace_id));
        };
        debug!(
            workspace_id,
            hash = %blob.hash,
            original_size = blob.original_size,
            compressed_size = blob.compressed_size,
            new_blob,
            pruned_blobs = pruned,
            "Saved file content"
        );

        self.get_file(workspace_id, path)
            .await?
            .ok_or_else(|| StoreError::not_found("file", path))
    }

    /// Content stored at `path` in this workspace, `None` if absent.
    pub async fn get_file_content(&self, workspace_id: &str, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let compressed: Option<Vec<u8>> = self
            .db
            .get(
                "SELECT c.compressed_content
                 FROM files f
                 JOIN file_contents c ON c.hash = f.content_hash
                 WHERE f.workspace_id = ?1 AND f.path = ?2",
                sql_params![workspace_id, path],
            )
            .await?;
        compressed.map(|c| ContentBlob::decode(&c)).transpose()
    }

    pub async fn get_file(&self, workspace_id: &str, path: &str) -> StoreResult<Option<FileRecord>> {
        Ok(self
            .db
            .get(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE workspace_id = ?1 AND path = ?2"),
                sql_params![workspace_id, path],
            )
            .await?)
    }

    /// Files of a workspace, ordered by path.
    pub async fn list_files(&self, workspace_id: &str) -> StoreResult<Vec<FileRecord>> {
        Ok(self
            .db
            .all(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE workspace_id = ?1 ORDER BY path"),
                sql_params![workspace_id],
            )
            .await?)
    }

    pub async fn delete_file(&self, workspace_id: &str, path: &str) -> StoreResult<()> {
        let removed = self
            .db
            .transaction(move |tx| async move {
                let deleted = tx
                    .run(
                        "DELETE FROM files WHERE workspace_id = ?1 AND path = ?2",
                        sql_params![workspace_id, path],
                    )
                    .await?;
                if deleted.changes == 0 {
                    return Ok(None);
                }
                Ok(Some(prune_orphaned_blobs(&tx).await?))
            })
            .await?;

        match removed {
            Some(pruned) => {
                info!(workspace_id, pruned_blobs = pruned, "Deleted file");
                Ok(())
            }
            None => Err(StoreError::not_found("file", path)),
        }
    }

    /// Totals over stored blobs and the files referencing them.
    pub async fn content_stats(&self) -> StoreResult<ContentStats> {
        let stats: Option<ContentStats> = self
            .db
            .get(
                "SELECT
                     (SELECT COUNT(*) FROM file_contents) AS blob_count,
                     (SELECT COUNT(*) FROM files) AS file_count,
                     (SELECT COALESCE(SUM(original_size), 0) FROM file_contents) AS original_bytes,
                     (SELECT COALESCE(SUM(compressed_size), 0) FROM file_contents) AS compressed_bytes",
                sql_params![],
            )
            .await?;
        stats.ok_or_else(|| StoreError::not_found("content stats", "file_contents"))
    }
}
