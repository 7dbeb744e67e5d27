//! Append-only audit log. Entries are never updated or deleted through this
//! crate; retention/redaction is an operational concern outside its scope.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub repository_id: Option<Uuid>,
    pub action: String,
    pub detail: Value,
    pub created_at: DateTime<Utc>,
}

pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
        actor_id: Option<Uuid>,
        repository_id: Option<Uuid>,
        action: &str,
        detail: Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, actor_id, repository_id, action, detail) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(actor_id)
        .bind(repository_id)
        .bind(action)
        .bind(detail)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn record(
        &self,
        id: Uuid,
        actor_id: Option<Uuid>,
        repository_id: Option<Uuid>,
        action: &str,
        detail: Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, actor_id, repository_id, action, detail) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(actor_id)
        .bind(repository_id)
        .bind(action)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_for_repository(&self, repository_id: Uuid, limit: i64) -> Result<Vec<AuditEntry>> {
        Ok(sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, actor_id, repository_id, action, detail, created_at
            FROM audit_log
            WHERE repository_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(repository_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}
