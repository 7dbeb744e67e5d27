//! Smart HTTP routes: `info/refs` advertisement plus the `upload-pack` and
//! `receive-pack` service endpoints (spec §4.7, C7 Transport Front-Ends).
//!
//! Never buffers a full pack into a String and never logs credentials;
//! bodies are streamed into axum's `Bytes` extractor (still a single
//! in-memory buffer per request, which is what `hubcore_git::receive_pack`
//! needs downstream, but bounded up front by `RequestBodyLimitLayer`
//! sized from `limits.max_pack_mb`).

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use hubcore_auth::{Capability, Scopes};
use hubcore_db::repository::RepoRecord;
use hubcore_git::{parse_receive_commands, Service};
use hubcore_pipeline::RequestContext;

use crate::http::auth::{authenticate, AuthContext};
use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InfoRefsQuery {
    service: Option<String>,
}

/// Strip the `.git` suffix Git clients always append to the repository
/// segment of the URL.
fn repo_name(segment: &str) -> &str {
    segment.strip_suffix(".git").unwrap_or(segment)
}

async fn load_repo(state: &AppState, owner: &str, name: &str) -> Result<RepoRecord, ApiError> {
    let Some((owner_kind, owner_id)) = state.owners.resolve(owner).await? else {
        return Err(ApiError::not_found());
    };
    state
        .pipeline
        .repo_repo
        .get_by_owner_and_name(owner_kind, owner_id, name)
        .await?
        .ok_or_else(ApiError::not_found)
}

/// Resolve the target repository and enforce `required` capability,
/// collapsing "doesn't exist" and "not allowed to see it" into the same
/// `404` per spec §7's disclosure rule.
async fn load_repo_authorized(
    state: &AppState,
    owner: &str,
    name: &str,
    auth: &AuthContext,
    required: Capability,
    scope_if_token: u32,
) -> Result<RepoRecord, ApiError> {
    let repo = load_repo(state, owner, name).await?;
    let capability = state.resolve_capability(auth.principal_id, &repo).await?;
    if capability < required || !auth.has_scope_if_token(scope_if_token) {
        return Err(ApiError::not_found());
    }
    Ok(repo)
}

fn check_ip(state: &AppState, addr: SocketAddr) -> Result<(), ApiError> {
    state
        .concurrency
        .check_ip(addr.ip())
        .map_err(|_| ApiError::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"))
}

pub async fn info_refs(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((owner, repo_segment)): Path<(String, String)>,
    Query(query): Query<InfoRefsQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    check_ip(&state, addr)?;
    let name = repo_name(&repo_segment);

    let Some(service) = query.service.as_deref().and_then(Service::from_str) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "unsupported or missing service"));
    };

    let auth = authenticate(&state, &headers).await?;
    let required = match service {
        Service::UploadPack => Capability::Read,
        Service::ReceivePack => Capability::Write,
    };
    let scope = match service {
        Service::UploadPack => Scopes::REPO_READ,
        Service::ReceivePack => Scopes::REPO_WRITE,
    };
    let repo = load_repo_authorized(&state, &owner, name, &auth, required, scope).await?;

    let repo_id = hubcore_storage::RepositoryId::from_uuid(repo.id);
    let handle = state.storage.open(repo_id)?;
    let body = state.engine.advertise_refs(handle.git_dir(), service).await?;

    Ok((
        StatusCode::OK,
        [("Content-Type", service.advertisement_content_type())],
        body,
    )
        .into_response())
}

pub async fn upload_pack(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((owner, repo_segment)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    check_ip(&state, addr)?;
    let name = repo_name(&repo_segment);

    let auth = authenticate(&state, &headers).await?;
    let repo = load_repo_authorized(&state, &owner, name, &auth, Capability::Read, Scopes::REPO_READ).await?;

    let repo_id = hubcore_storage::RepositoryId::from_uuid(repo.id);
    let handle = state.storage.open(repo_id)?;
    let response_body = state.engine.upload_pack(handle.git_dir(), &body).await?;

    Ok((
        StatusCode::OK,
        [("Content-Type", Service::UploadPack.result_content_type())],
        response_body,
    )
        .into_response())
}

pub async fn receive_pack(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((owner, repo_segment)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    check_ip(&state, addr)?;
    let name = repo_name(&repo_segment);

    let max_pack_bytes = state.config.limits.max_pack_mb.saturating_mul(1024 * 1024);
    if body.len() as u64 > max_pack_bytes {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "pack exceeds configured size limit"));
    }

    let auth = authenticate(&state, &headers).await?;
    // `load_repo` only, not `load_repo_authorized`: an unauthorized push
    // attempt still needs to flow into the pipeline so it's audit-logged
    // and reported per-command on the side-band, rather than silently
    // disappearing as a 404 the way a disallowed fetch does.
    let repo = load_repo(&state, &owner, name).await?;
    if !auth.has_scope_if_token(Scopes::REPO_WRITE) {
        return Err(ApiError::not_found());
    }

    let (commands, pack_offset) = parse_receive_commands(&body);
    let pack_data = &body[pack_offset..];

    // Per-principal concurrency cap (spec §6's
    // `limits.per_principal_concurrent_pushes`); anonymous pushes never
    // reach here since the pipeline immediately denies them for lacking
    // write capability, so the cap only ever needs a real principal id.
    let _guard = match auth.principal_id {
        Some(pid) => Some(state.concurrency.acquire_push_slot(pid).await),
        None => None,
    };

    let req_ctx = RequestContext::new();
    let pipeline = hubcore_pipeline::ReceivePushPipeline::new((*state.pipeline).clone());
    let outcome = pipeline
        .run(&repo, auth.principal_id, commands, pack_data, &req_ctx)
        .await?;

    Ok((
        StatusCode::OK,
        [("Content-Type", Service::ReceivePack.result_content_type())],
        outcome.report_status,
    )
        .into_response())
}
