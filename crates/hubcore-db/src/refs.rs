//! Cached ref targets, written inside the same transaction as the rest of
//! a push so the metadata store always reflects what the filesystem should
//! contain. The write pipeline's crash-recovery scan compares this table
//! against each repository's actual on-disk refs to catch a process that
//! died between the filesystem commit and the metadata commit.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefRecord {
    pub repository_id: Uuid,
    pub ref_name: String,
    pub target_oid: String,
}

pub struct RefRepository {
    pool: PgPool,
}

impl RefRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_by_repo(&self, repository_id: Uuid) -> Result<Vec<RefRecord>> {
        Ok(sqlx::query_as::<_, RefRecord>(
            "SELECT repository_id, ref_name, target_oid FROM ref_records WHERE repository_id = $1",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Upsert within a caller-owned transaction, so ref bookkeeping commits
    /// atomically with the rest of a push (outbox events, audit log).
    pub async fn upsert_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        repository_id: Uuid,
        ref_name: &str,
        target_oid: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ref_records (repository_id, ref_name, target_oid, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (repository_id, ref_name)
            DO UPDATE SET target_oid = EXCLUDED.target_oid, updated_at = now()
            "#,
        )
        .bind(repository_id)
        .bind(ref_name)
        .bind(target_oid)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn delete_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        repository_id: Uuid,
        ref_name: &str,
    ) -> Result<()> {
        sqlx::query("DELETE FROM ref_records WHERE repository_id = $1 AND ref_name = $2")
            .bind(repository_id)
            .bind(ref_name)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
