use hubcore_protect::ProtectionRule;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(sqlx::FromRow)]
struct ProtectionRuleRow {
    pattern: String,
    block_force_push: bool,
    block_deletion: bool,
    required_approving_review_count: i32,
    required_status_checks: Vec<String>,
    require_strict_status_checks: bool,
    admins_bypass: bool,
}

impl From<ProtectionRuleRow> for ProtectionRule {
    fn from(row: ProtectionRuleRow) -> Self {
        ProtectionRule {
            pattern: row.pattern,
            block_force_push: row.block_force_push,
            block_deletion: row.block_deletion,
            required_approving_review_count: row.required_approving_review_count.max(0) as u32,
            required_status_checks: row.required_status_checks,
            require_strict_status_checks: row.require_strict_status_checks,
            admins_bypass: row.admins_bypass,
        }
    }
}

pub struct ProtectionRepository {
    pool: PgPool,
}

impl ProtectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cached on disk by the write pipeline alongside the repository (see
    /// `hub/protection.json`), so the hot push path doesn't take a round
    /// trip here on every push; this is the source of truth the cache is
    /// refreshed from.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_repo(&self, repository_id: Uuid) -> Result<Vec<ProtectionRule>> {
        let rows = sqlx::query_as::<_, ProtectionRuleRow>(
            "SELECT pattern, block_force_push, block_deletion, required_approving_review_count, required_status_checks, require_strict_status_checks, admins_bypass FROM protection_rules WHERE repository_id = $1",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(skip(self, rule))]
    pub async fn upsert(&self, id: Uuid, repository_id: Uuid, rule: &ProtectionRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO protection_rules
                (id, repository_id, pattern, block_force_push, block_deletion,
                 required_approving_review_count, required_status_checks,
                 require_strict_status_checks, admins_bypass)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                block_force_push = EXCLUDED.block_force_push,
                block_deletion = EXCLUDED.block_deletion,
                required_approving_review_count = EXCLUDED.required_approving_review_count,
                required_status_checks = EXCLUDED.required_status_checks,
                require_strict_status_checks = EXCLUDED.require_strict_status_checks,
                admins_bypass = EXCLUDED.admins_bypass
            "#,
        )
        .bind(id)
        .bind(repository_id)
        .bind(&rule.pattern)
        .bind(rule.block_force_push)
        .bind(rule.block_deletion)
        .bind(rule.required_approving_review_count as i32)
        .bind(&rule.required_status_checks)
        .bind(rule.require_strict_status_checks)
        .bind(rule.admins_bypass)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM protection_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
