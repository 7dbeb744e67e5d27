//! Transactional outbox: events land in this table in the same transaction
//! as the domain write that produced them, so a publisher relay can poll
//! for unpublished rows and guarantee at-least-once delivery to webhooks,
//! CI triggers, and search indexing without a two-phase commit.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub repository_id: Option<Uuid>,
    pub event_type: String,
    pub payload: Value,
    /// Monotonic per-repository ordinal (absent for repository-less
    /// events). Consumers that must observe push order for one repository
    /// — rather than global `created_at` order, which two commits landing
    /// in the same instant can't distinguish — sort on this instead.
    pub repo_sequence: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one event inside the caller's transaction. When
    /// `repository_id` is set, `repo_sequence` is assigned from
    /// `next_repo_outbox_sequence`, so consumers can recover push order
    /// for a single repository even when two commits land in the same
    /// wall-clock instant.
    pub async fn insert_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
        repository_id: Option<Uuid>,
        event_type: &str,
        payload: Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (id, repository_id, event_type, payload, repo_sequence)
            VALUES ($1, $2, $3, $4, CASE WHEN $2::uuid IS NULL THEN NULL ELSE next_repo_outbox_sequence($2) END)
            "#,
        )
        .bind(id)
        .bind(repository_id)
        .bind(event_type)
        .bind(payload)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        Ok(sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, repository_id, event_type, payload, repo_sequence, created_at, published_at
            FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Unpublished events for one repository, in guaranteed push order.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_unpublished_for_repo(&self, repository_id: Uuid) -> Result<Vec<OutboxEvent>> {
        Ok(sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT id, repository_id, event_type, payload, repo_sequence, created_at, published_at
            FROM outbox_events
            WHERE repository_id = $1 AND published_at IS NULL
            ORDER BY repo_sequence
            "#,
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_published(&self, ids: &[Uuid]) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET published_at = now() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
