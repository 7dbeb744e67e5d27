//! Durable job queue backing `hubcore_jobs`'s worker pools. Leasing uses
//! `SELECT ... FOR UPDATE SKIP LOCKED` so concurrent workers never contend
//! on the same row and never double-lease a job.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Leased,
    Succeeded,
    Failed,
    Dead,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: String,
    pub payload: Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_after: DateTime<Utc>,
    pub lease_token: Option<Uuid>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        id: Uuid,
        kind: &str,
        payload: Value,
        run_after: DateTime<Utc>,
        max_attempts: i32,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (id, kind, payload, run_after, max_attempts) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(kind)
        .bind(payload)
        .bind(run_after)
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Lease one ready job of `kind`, marking it `leased` with a fresh
    /// lease token and expiry. Returns `None` when nothing is ready.
    #[tracing::instrument(skip(self))]
    pub async fn lease_next(
        &self,
        kind: &str,
        lease_duration_secs: i64,
    ) -> Result<Option<(JobRecord, Uuid)>> {
        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT * FROM jobs
            WHERE kind = $1 AND status = 'queued' AND run_after <= now()
            ORDER BY run_after
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(kind)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let lease_token = Uuid::new_v4();
        sqlx::query(
            r#"
            UPDATE jobs SET
                status = 'leased',
                lease_token = $1,
                lease_expires_at = now() + make_interval(secs => $2),
                attempts = attempts + 1,
                updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(lease_token)
        .bind(lease_duration_secs as f64)
        .bind(job.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((job, lease_token)))
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, id: Uuid, lease_token: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'succeeded', updated_at = now() WHERE id = $1 AND lease_token = $2",
        )
        .bind(id)
        .bind(lease_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt. Reschedules for `retry_after` if attempts
    /// remain under the job's `max_attempts`, otherwise marks it `dead`.
    #[tracing::instrument(skip(self, error))]
    pub async fn fail(
        &self,
        id: Uuid,
        lease_token: Uuid,
        error: &str,
        retry_after: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                status = CASE WHEN attempts >= max_attempts THEN 'dead' ELSE 'queued' END,
                run_after = $3,
                last_error = $4,
                lease_token = NULL,
                lease_expires_at = NULL,
                updated_at = now()
            WHERE id = $1 AND lease_token = $2
            "#,
        )
        .bind(id)
        .bind(lease_token)
        .bind(retry_after)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Dead-letter a job immediately, bypassing backoff entirely. For
    /// failures a retry can never fix (bad payload shape, unknown kind) —
    /// rescheduling those just burns `max_attempts` attempts to reach the
    /// same `dead` state `fail` would have landed on eventually.
    #[tracing::instrument(skip(self, error))]
    pub async fn kill(&self, id: Uuid, lease_token: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                status = 'dead',
                last_error = $3,
                lease_token = NULL,
                lease_expires_at = NULL,
                updated_at = now()
            WHERE id = $1 AND lease_token = $2
            "#,
        )
        .bind(id)
        .bind(lease_token)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reclaim jobs whose lease has expired without a `complete`/`fail`
    /// call — the worker that held them died. Run periodically by the
    /// janitor.
    #[tracing::instrument(skip(self))]
    pub async fn reclaim_expired_leases(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'queued', lease_token = NULL, lease_expires_at = NULL, updated_at = now()
            WHERE status = 'leased' AND lease_expires_at < now()
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
