//! Repository metadata: the `(owner, name)` identity and visibility that
//! sit on top of `hubcore_storage`'s id-keyed on-disk layout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    Org,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    /// Readable by any authenticated principal, opaque to anonymous
    /// callers — resolved like `Private` for anonymous and like `Public`
    /// for anyone logged in (see `hubcore_auth::CapabilityFacts`).
    Internal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepoRecord {
    pub id: Uuid,
    pub owner_kind: OwnerKind,
    pub owner_id: Uuid,
    pub name: String,
    pub visibility: Visibility,
    pub default_branch: String,
    pub disk_path_hint: Option<String>,
    pub size_bytes: i64,
    pub primary_language: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub webhook_url: Option<String>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
    pub soft_deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait RepoStore: Send + Sync {
    async fn create_repo(
        &self,
        id: Uuid,
        owner_kind: OwnerKind,
        owner_id: Uuid,
        name: &str,
        visibility: Visibility,
        default_branch: &str,
    ) -> Result<RepoRecord>;

    async fn get_repo_by_id(&self, id: Uuid) -> Result<Option<RepoRecord>>;
    async fn get_repo_by_owner_and_name(
        &self,
        owner_kind: OwnerKind,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<RepoRecord>>;
    async fn rename_repo(&self, id: Uuid, new_name: &str) -> Result<()>;
    async fn set_visibility(&self, id: Uuid, visibility: Visibility) -> Result<()>;
    async fn soft_delete_repo(&self, id: Uuid) -> Result<()>;

    /// Lock the repository's row for update within an existing
    /// transaction. The second half of the write pipeline's two-lock
    /// ordering: the filesystem lock (`hubcore_storage::lock`) must
    /// already be held before this is called.
    async fn lock_repo_for_update(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<RepoRecord>;
}

pub struct RepoRepository {
    pool: PgPool,
}

impl RepoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(repo_id = %id))]
    pub async fn create(
        &self,
        id: Uuid,
        owner_kind: OwnerKind,
        owner_id: Uuid,
        name: &str,
        visibility: Visibility,
        default_branch: &str,
    ) -> Result<RepoRecord> {
        sqlx::query_as::<_, RepoRecord>(
            r#"
            INSERT INTO repositories (id, owner_kind, owner_id, name, visibility, default_branch)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_kind)
        .bind(owner_id)
        .bind(name)
        .bind(visibility)
        .bind(default_branch)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_unique_violation(e, format!("repository {name} already exists")))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<RepoRecord>> {
        Ok(
            sqlx::query_as::<_, RepoRecord>("SELECT * FROM repositories WHERE id = $1 AND soft_deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_owner_and_name(
        &self,
        owner_kind: OwnerKind,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<RepoRecord>> {
        Ok(sqlx::query_as::<_, RepoRecord>(
            r#"
            SELECT * FROM repositories
            WHERE owner_kind = $1 AND owner_id = $2 AND name = $3 AND soft_deleted_at IS NULL
            "#,
        )
        .bind(owner_kind)
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn rename(&self, id: Uuid, new_name: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repositories SET name = $1, updated_at = now() WHERE id = $2 AND soft_deleted_at IS NULL",
        )
        .bind(new_name)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_unique_violation(e, format!("name {new_name} already in use")))?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_visibility(&self, id: Uuid, visibility: Visibility) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repositories SET visibility = $1, updated_at = now() WHERE id = $2 AND soft_deleted_at IS NULL",
        )
        .bind(visibility)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE repositories SET soft_deleted_at = now() WHERE id = $1 AND soft_deleted_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// `SELECT ... FOR UPDATE` on the repository row, inside a caller-owned
    /// transaction. Callers must acquire repository rows in ascending id
    /// order across a single pipeline run to avoid deadlocking with the
    /// janitor's own locking pass.
    #[tracing::instrument(skip(self, tx))]
    pub async fn lock_for_update(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<RepoRecord> {
        sqlx::query_as::<_, RepoRecord>("SELECT * FROM repositories WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Update the post-push accounting fields (reconciliation step 6 of the
    /// write pipeline) within the caller's transaction: on-disk size and
    /// the timestamp of the most recent push.
    #[tracing::instrument(skip(self, tx))]
    pub async fn record_activity_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
        size_bytes: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE repositories SET size_bytes = $1, last_activity_at = now(), updated_at = now() WHERE id = $2",
        )
        .bind(size_bytes)
        .bind(id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Listing never surfaces soft-deleted repositories, the mechanism
    /// behind scenario 6's "repo vanishes from listings immediately".
    #[tracing::instrument(skip(self))]
    pub async fn list_by_owner(&self, owner_kind: OwnerKind, owner_id: Uuid) -> Result<Vec<RepoRecord>> {
        Ok(sqlx::query_as::<_, RepoRecord>(
            r#"
            SELECT * FROM repositories
            WHERE owner_kind = $1 AND owner_id = $2 AND soft_deleted_at IS NULL
            ORDER BY name
            "#,
        )
        .bind(owner_kind)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Mark a repository reconciled as of now, after a successful startup
    /// reconciliation pass or a normal push through the write pipeline.
    #[tracing::instrument(skip(self, tx))]
    pub async fn mark_reconciled_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<()> {
        sqlx::query("UPDATE repositories SET last_reconciled_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// All non-deleted repositories, for the startup scan to pair against
    /// on-disk ref mtimes. Small deployments only; a real fleet would page
    /// this or index on `last_reconciled_at`.
    #[tracing::instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<RepoRecord>> {
        Ok(sqlx::query_as::<_, RepoRecord>("SELECT * FROM repositories WHERE soft_deleted_at IS NULL")
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl RepoStore for RepoRepository {
    async fn create_repo(
        &self,
        id: Uuid,
        owner_kind: OwnerKind,
        owner_id: Uuid,
        name: &str,
        visibility: Visibility,
        default_branch: &str,
    ) -> Result<RepoRecord> {
        self.create(id, owner_kind, owner_id, name, visibility, default_branch).await
    }

    async fn get_repo_by_id(&self, id: Uuid) -> Result<Option<RepoRecord>> {
        self.get_by_id(id).await
    }

    async fn get_repo_by_owner_and_name(
        &self,
        owner_kind: OwnerKind,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<RepoRecord>> {
        self.get_by_owner_and_name(owner_kind, owner_id, name).await
    }

    async fn rename_repo(&self, id: Uuid, new_name: &str) -> Result<()> {
        self.rename(id, new_name).await
    }

    async fn set_visibility(&self, id: Uuid, visibility: Visibility) -> Result<()> {
        self.set_visibility(id, visibility).await
    }

    async fn soft_delete_repo(&self, id: Uuid) -> Result<()> {
        self.soft_delete(id).await
    }

    async fn lock_repo_for_update(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<RepoRecord> {
        self.lock_for_update(tx, id).await
    }
}
