use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_enum, parse_uuid};
use crate::{
    models::TransferStatus,
    store::{
        error::{StoreError, StoreResult},
        repos::{TransferRepo, TransferRow},
    },
};

pub struct SqliteTransferRepo {
    pool: SqlitePool,
}

impl SqliteTransferRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_transfer(row: &SqliteRow) -> StoreResult<TransferRow> {
        Ok(TransferRow {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            conversation_group_id: parse_uuid(&row.get::<String, _>("conversation_group_id"))?,
            from_user_id: row.get("from_user_id"),
            to_user_id: row.get("to_user_id"),
            status: parse_enum(&row.get::<String, _>("status"))?,
            created_at: row.get("created_at"),
            resolved_at: row.get("resolved_at"),
        })
    }
}

#[async_trait]
impl TransferRepo for SqliteTransferRepo {
    async fn create(&self, row: &TransferRow) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO ownership_transfers
                (id, conversation_group_id, from_user_id, to_user_id, status, created_at, resolved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(row.conversation_group_id.to_string())
        .bind(&row.from_user_id)
        .bind(&row.to_user_id)
        .bind(row.status.as_str())
        .bind(row.created_at)
        .bind(row.resolved_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if StoreError::is_unique_violation(&e) => Err(StoreError::UniqueViolation(
                "a pending transfer already exists for this group".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<TransferRow>> {
        let row = sqlx::query("SELECT * FROM ownership_transfers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_transfer).transpose()
    }

    async fn find_pending(&self, group_id: Uuid) -> StoreResult<Option<TransferRow>> {
        let row = sqlx::query(
            "SELECT * FROM ownership_transfers WHERE conversation_group_id = ? AND status = 'pending'",
        )
        .bind(group_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_transfer).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<TransferRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM ownership_transfers
            WHERE from_user_id = ? OR to_user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_transfer).collect()
    }

    async fn cancel(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE ownership_transfers SET status = 'cancelled', resolved_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn accept(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<TransferRow> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM ownership_transfers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };
        let mut transfer = Self::row_to_transfer(&row)?;
        if transfer.status != TransferStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "transfer is {}",
                transfer.status.as_str()
            )));
        }

        // The owner swap and the downgrade happen in one transaction so
        // the single-owner invariant holds at every commit point. The
        // prior owner drops to manager first to free the partial unique
        // index slot.
        sqlx::query(
            r#"
            UPDATE conversation_memberships SET access_level = 'manager', updated_at = ?
            WHERE conversation_group_id = ? AND user_id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(at)
        .bind(transfer.conversation_group_id.to_string())
        .bind(&transfer.from_user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversation_memberships SET access_level = 'owner', updated_at = ?, deleted_at = NULL
            WHERE conversation_group_id = ? AND user_id = ?
            "#,
        )
        .bind(at)
        .bind(transfer.conversation_group_id.to_string())
        .bind(&transfer.to_user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversation_groups SET owner_user_id = ?, updated_at = ? WHERE id = ?")
            .bind(&transfer.to_user_id)
            .bind(at)
            .bind(transfer.conversation_group_id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE ownership_transfers SET status = 'accepted', resolved_at = ? WHERE id = ?",
        )
        .bind(at)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        transfer.status = TransferStatus::Accepted;
        transfer.resolved_at = Some(at);
        Ok(transfer)
    }
}
