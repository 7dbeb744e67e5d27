//! Resolves the raw access facts `hubcore_auth::capability::resolve` needs:
//! ownership, org role, team role, and direct collaborator role.

use hubcore_auth::Capability;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::repository::{OwnerKind, RepoRecord};

fn capability_from_role(role: &str) -> Capability {
    match role {
        "read" => Capability::Read,
        "triage" => Capability::Triage,
        "write" => Capability::Write,
        "maintain" => Capability::Maintain,
        "admin" => Capability::Admin,
        _ => Capability::None,
    }
}

pub struct GrantRepository {
    pool: PgPool,
}

impl GrantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, repo))]
    pub async fn capability_facts(
        &self,
        principal_id: Option<Uuid>,
        repo: &RepoRecord,
    ) -> Result<hubcore_auth::CapabilityFacts> {
        let Some(principal_id) = principal_id else {
            // Anonymous: `internal` resolves like `private` — only an
            // actual `public` repository grants read with no principal.
            return Ok(hubcore_auth::CapabilityFacts {
                repository_is_public: repo.visibility == crate::repository::Visibility::Public,
                ..Default::default()
            });
        };

        let is_owner = repo.owner_kind == OwnerKind::User && repo.owner_id == principal_id;

        let org_role: Option<String> = if repo.owner_kind == OwnerKind::Org {
            sqlx::query_scalar(
                "SELECT role FROM org_members WHERE org_id = $1 AND principal_id = $2",
            )
            .bind(repo.owner_id)
            .bind(principal_id)
            .fetch_optional(&self.pool)
            .await?
        } else {
            None
        };

        let team_role: Option<String> = sqlx::query_scalar(
            r#"
            SELECT tra.role FROM team_repo_access tra
            JOIN team_members tm ON tm.team_id = tra.team_id
            WHERE tra.repository_id = $1 AND tm.principal_id = $2
            ORDER BY CASE tra.role
                WHEN 'admin' THEN 5 WHEN 'maintain' THEN 4 WHEN 'write' THEN 3
                WHEN 'triage' THEN 2 ELSE 1 END DESC
            LIMIT 1
            "#,
        )
        .bind(repo.id)
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await?;

        let collaborator_role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM collaborators WHERE repository_id = $1 AND principal_id = $2",
        )
        .bind(repo.id)
        .bind(principal_id)
        .fetch_optional(&self.pool)
        .await?;

        // Any authenticated principal reaches this branch, so `internal`
        // grants the same implicit read that `public` grants anonymously.
        let repository_is_public = matches!(
            repo.visibility,
            crate::repository::Visibility::Public | crate::repository::Visibility::Internal
        );

        Ok(hubcore_auth::CapabilityFacts {
            is_owner,
            org_role: org_role.as_deref().map(capability_from_role),
            team_role: team_role.as_deref().map(capability_from_role),
            collaborator_role: collaborator_role.as_deref().map(capability_from_role),
            repository_is_public,
        })
    }

    pub async fn set_collaborator_role(&self, repository_id: Uuid, principal_id: Uuid, role: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collaborators (repository_id, principal_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (repository_id, principal_id) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(repository_id)
        .bind(principal_id)
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_collaborator(&self, repository_id: Uuid, principal_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM collaborators WHERE repository_id = $1 AND principal_id = $2")
            .bind(repository_id)
            .bind(principal_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
