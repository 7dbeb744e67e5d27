//! Principals (users and service accounts), and the credentials that
//! authenticate them: passwords, bearer tokens, and SSH keys.

use chrono::{DateTime, Utc};
use hubcore_auth::Scopes;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    ServiceAccount,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Principal {
    pub id: Uuid,
    pub kind: PrincipalKind,
    pub login: String,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct PrincipalRepository {
    pool: PgPool,
}

impl PrincipalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, password_hash))]
    pub async fn create(
        &self,
        id: Uuid,
        kind: PrincipalKind,
        login: &str,
        password_hash: Option<&str>,
    ) -> Result<Principal> {
        sqlx::query_as::<_, Principal>(
            "INSERT INTO principals (id, kind, login, password_hash) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(id)
        .bind(kind)
        .bind(login)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_unique_violation(e, format!("login {login} already taken")))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        Ok(sqlx::query_as::<_, Principal>("SELECT * FROM principals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_by_login(&self, login: &str) -> Result<Option<Principal>> {
        Ok(sqlx::query_as::<_, Principal>("SELECT * FROM principals WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    principal_id: Uuid,
    scopes: i32,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<TokenRow> for hubcore_auth::TokenRecord {
    fn from(row: TokenRow) -> Self {
        hubcore_auth::TokenRecord {
            id: row.id,
            principal_id: row.principal_id,
            scopes: Scopes::new(row.scopes as u32),
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
        }
    }
}

pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn hash(plain_token: &str) -> String {
        hex::encode(Sha256::digest(plain_token.as_bytes()))
    }

    #[tracing::instrument(skip(self, plain_token))]
    pub async fn create(
        &self,
        id: Uuid,
        principal_id: Uuid,
        plain_token: &str,
        scopes: Scopes,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO tokens (id, principal_id, token_hash, scopes, expires_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(principal_id)
        .bind(Self::hash(plain_token))
        .bind(scopes.0 as i32)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a token by its plain value. The caller is responsible for
    /// checking [`hubcore_auth::TokenRecord::is_usable`] — this only
    /// resolves the hash to a record.
    pub async fn get_by_plain_token(&self, plain_token: &str) -> Result<Option<hubcore_auth::TokenRecord>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT id, principal_id, scopes, expires_at, revoked_at FROM tokens WHERE token_hash = $1")
            .bind(Self::hash(plain_token))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn revoke(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE tokens SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

pub struct SshKeyRepository {
    pool: PgPool,
}

impl SshKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, id: Uuid, principal_id: Uuid, public_key_blob: &[u8]) -> Result<()> {
        let fingerprint = hubcore_auth::ssh::fingerprint(public_key_blob);
        sqlx::query(
            "INSERT INTO ssh_keys (id, principal_id, fingerprint, public_key_blob) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(principal_id)
        .bind(&fingerprint)
        .bind(public_key_blob)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_unique_violation(e, "key already registered"))?;
        Ok(())
    }

    /// Resolve a presented public key blob to its owning principal, by
    /// fingerprint, without ever comparing raw key bytes in SQL.
    pub async fn find_principal_by_public_key(&self, public_key_blob: &[u8]) -> Result<Option<Uuid>> {
        let fingerprint = hubcore_auth::ssh::fingerprint(public_key_blob);
        Ok(
            sqlx::query_scalar::<_, Uuid>("SELECT principal_id FROM ssh_keys WHERE fingerprint = $1")
                .bind(&fingerprint)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}
