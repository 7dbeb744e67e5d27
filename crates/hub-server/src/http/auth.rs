//! Smart HTTP credential resolution (spec §4.3, C3 Auth Resolver).
//!
//! Accepts `Authorization: Basic <user>:<password-or-token>` and
//! `Authorization: Bearer <token-or-jwt>`, per the supplemental note in
//! `SPEC_FULL.md` §11 that Git clients commonly send a personal access
//! token in the Basic password field rather than as a literal bearer.

use axum::http::HeaderMap;
use base64::Engine;
use uuid::Uuid;

use hubcore_auth::Scopes;

use crate::http::error::ApiError;
use crate::state::AppState;

/// The authenticated identity for one request, plus the token scope
/// bitmap if the credential was a token (password/JWT credentials carry
/// no scope restriction beyond the principal's resolved capability).
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub principal_id: Option<Uuid>,
    pub token_scopes: Option<Scopes>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A token-scoped Git operation additionally requires the token carry
    /// the matching scope; password/JWT-authenticated principals have no
    /// scope bitmap to check, so they pass as long as they're
    /// authenticated at all (capability resolution gates the rest).
    pub fn has_scope_if_token(&self, flag: u32) -> bool {
        match self.token_scopes {
            Some(scopes) => scopes.contains(flag),
            None => true,
        }
    }
}

/// Resolve the `Authorization` header into an [`AuthContext`]. Absence of
/// the header is not an error — it resolves to [`AuthContext::anonymous`],
/// since Git transports allow anonymous reads of public repositories.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
    let Some(raw) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(AuthContext::anonymous());
    };
    let raw = raw.to_str().map_err(|_| ApiError::unauthorized())?;

    if let Some(encoded) = raw.strip_prefix("Basic ") {
        return authenticate_basic(state, encoded).await;
    }
    if let Some(token) = raw.strip_prefix("Bearer ") {
        return authenticate_bearer(state, token).await;
    }

    Err(ApiError::unauthorized())
}

async fn authenticate_basic(state: &AppState, encoded: &str) -> Result<AuthContext, ApiError> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::unauthorized())?;
    let decoded = String::from_utf8(decoded).map_err(|_| ApiError::unauthorized())?;
    let Some((login, secret)) = decoded.split_once(':') else {
        return Err(ApiError::unauthorized());
    };

    // Try the secret as a personal access token first (the common case for
    // scripted/CI Git remotes), then fall back to password verification
    // against the named principal.
    if let Some(ctx) = try_token(state, secret).await? {
        return Ok(ctx);
    }

    let Some(principal) = state
        .principals
        .get_by_login(login)
        .await
        .map_err(ApiError::from)?
    else {
        return Err(ApiError::unauthorized());
    };

    state.lockout.check(login).map_err(|_| ApiError::unauthorized())?;

    let Some(hash) = principal.password_hash.as_deref() else {
        return Err(ApiError::unauthorized());
    };

    if !hubcore_auth::verify_password(hash, secret) {
        state.lockout.record_failure(login);
        return Err(ApiError::unauthorized());
    }
    state.lockout.record_success(login);

    Ok(AuthContext {
        principal_id: Some(principal.id),
        token_scopes: None,
    })
}

async fn authenticate_bearer(state: &AppState, raw_token: &str) -> Result<AuthContext, ApiError> {
    if let Some(ctx) = try_token(state, raw_token).await? {
        return Ok(ctx);
    }

    let claims = state.jwt.verify(raw_token).map_err(|_| ApiError::unauthorized())?;
    Ok(AuthContext {
        principal_id: Some(claims.sub),
        token_scopes: None,
    })
}

async fn try_token(state: &AppState, raw: &str) -> Result<Option<AuthContext>, ApiError> {
    let Some(record) = state.tokens.get_by_plain_token(raw).await.map_err(ApiError::from)? else {
        return Ok(None);
    };
    record.is_usable(chrono::Utc::now()).map_err(|_| ApiError::unauthorized())?;
    Ok(Some(AuthContext {
        principal_id: Some(record.principal_id),
        token_scopes: Some(record.scopes),
    }))
}
