use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::common::parse_enum;
use crate::{
    models::TransferStatus,
    store::{
        error::{StoreError, StoreResult},
        repos::{TransferRepo, TransferRow},
    },
};

pub struct PostgresTransferRepo {
    pool: PgPool,
}

impl PostgresTransferRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_transfer(row: &PgRow) -> StoreResult<TransferRow> {
        Ok(TransferRow {
            id: row.get("id"),
            conversation_group_id: row.get("conversation_group_id"),
            from_user_id: row.get("from_user_id"),
            to_user_id: row.get("to_user_id"),
            status: parse_enum(&row.get::<String, _>("status"))?,
            created_at: row.get("created_at"),
            resolved_at: row.get("resolved_at"),
        })
    }
}

#[async_trait]
impl TransferRepo for PostgresTransferRepo {
    async fn create(&self, row: &TransferRow) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO ownership_transfers
                (id, conversation_group_id, from_user_id, to_user_id, status, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.id)
        .bind(row.conversation_group_id)
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
        let row = sqlx::query("SELECT * FROM ownership_transfers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_transfer).transpose()
    }

    async fn find_pending(&self, group_id: Uuid) -> StoreResult<Option<TransferRow>> {
        let row = sqlx::query(
            "SELECT * FROM ownership_transfers WHERE conversation_group_id = $1 AND status = 'pending'",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_transfer).transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<TransferRow>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM ownership_transfers
            WHERE from_user_id = $1 OR to_user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_transfer).collect()
    }

    async fn cancel(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE ownership_transfers SET status = 'cancelled', resolved_at = $1 WHERE id = $2 AND status = 'pending'",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn accept(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<TransferRow> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM ownership_transfers WHERE id = $1 FOR UPDATE")
            .bind(id)
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

        // Owner swap and downgrade in one transaction; the prior owner
        // drops first to free the single-owner partial unique index.
        sqlx::query(
            r#"
            UPDATE conversation_memberships SET access_level = 'manager', updated_at = $1
            WHERE conversation_group_id = $2 AND user_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(at)
        .bind(transfer.conversation_group_id)
        .bind(&transfer.from_user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversation_memberships SET access_level = 'owner', updated_at = $1, deleted_at = NULL
            WHERE conversation_group_id = $2 AND user_id = $3
            "#,
        )
        .bind(at)
        .bind(transfer.conversation_group_id)
        .bind(&transfer.to_user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversation_groups SET owner_user_id = $1, updated_at = $2 WHERE id = $3")
            .bind(&transfer.to_user_id)
            .bind(at)
            .bind(transfer.conversation_group_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE ownership_transfers SET status = 'accepted', resolved_at = $1 WHERE id = $2",
        )
        .bind(at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        transfer.status = TransferStatus::Accepted;
        transfer.resolved_at = Some(at);
        Ok(transfer)
    }
}
