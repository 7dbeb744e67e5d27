//! Smart HTTP front-end: builds the axum [`Router`] that serves
//! `info/refs`, `git-upload-pack`, and `git-receive-pack` under
//! `/:owner/:repo`, the same path shape the Git client itself constructs
//! from a `https://host/owner/repo.git` remote URL.

pub mod auth;
pub mod error;
pub mod git;

use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let max_body_bytes = (state.config.limits.max_pack_mb.saturating_mul(1024 * 1024)) as usize;

    Router::new()
        .route("/{owner}/{repo}/info/refs", get(git::info_refs))
        .route("/{owner}/{repo}/git-upload-pack", post(git::upload_pack))
        .route("/{owner}/{repo}/git-receive-pack", post(git::receive_pack))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
