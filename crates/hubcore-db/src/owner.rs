//! Resolves the `<owner>` segment of a `<owner>/<name>.git` path to the
//! `(owner_kind, owner_id)` pair `RepoRepository::get_by_owner_and_name`
//! needs. A handle is a user login or an org slug; the two namespaces are
//! disjoint (enforced by each table's own unique constraint), so at most
//! one of the two lookups ever matches.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::repository::OwnerKind;

pub struct OwnerRepository {
    pool: PgPool,
}

impl OwnerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, handle: &str) -> Result<Option<(OwnerKind, Uuid)>> {
        if let Some(id) = sqlx::query_scalar::<_, Uuid>("SELECT id FROM principals WHERE login = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(Some((OwnerKind::User, id)));
        }

        if let Some(id) = sqlx::query_scalar::<_, Uuid>("SELECT id FROM orgs WHERE slug = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(Some((OwnerKind::Org, id)));
        }

        Ok(None)
    }
}
