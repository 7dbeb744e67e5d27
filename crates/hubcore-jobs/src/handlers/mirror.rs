//! `repo.import`, `repo.export`, and `repo.purge` handlers — thin wrappers
//! over `hubcore_storage::mirror` and `hubcore_storage::store` that decode
//! the job payload and report back through the job's own error channel.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Serialize)]
pub struct RepoImportPayload {
    pub repository_id: uuid::Uuid,
    pub remote_url: String,
    pub token: Option<String>,
}

pub async fn handle_import(
    store: &hubcore_storage::RepoStore,
    payload: serde_json::Value,
) -> Result<()> {
    let payload: RepoImportPayload =
        serde_json::from_value(payload).map_err(|e| Error::BadPayload(e.to_string()))?;

    let handle = store.open(hubcore_storage::RepositoryId::from_uuid(payload.repository_id))?;
    let options = hubcore_storage::types::ImportOptions {
        refs: None,
        dry_run: false,
        bundle: false,
        token: payload.token,
    };
    hubcore_storage::mirror::import(handle.git_dir(), &payload.remote_url, &options)?;
    Ok(())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RepoExportPayload {
    pub repository_id: uuid::Uuid,
    pub remote_url: String,
    pub token: Option<String>,
}

pub async fn handle_export(
    store: &hubcore_storage::RepoStore,
    payload: serde_json::Value,
) -> Result<()> {
    let payload: RepoExportPayload =
        serde_json::from_value(payload).map_err(|e| Error::BadPayload(e.to_string()))?;

    let handle = store.open(hubcore_storage::RepositoryId::from_uuid(payload.repository_id))?;
    let dest = hubcore_storage::mirror::with_token(&payload.remote_url, payload.token.as_deref());
    let options = hubcore_storage::types::ExportOptions {
        refs: None,
        dry_run: false,
        bundle: false,
    };
    hubcore_storage::mirror::export(handle.git_dir(), &dest, &options)?;
    Ok(())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RepoPurgePayload {
    pub repository_id: uuid::Uuid,
}

pub async fn handle_purge(
    store: &hubcore_storage::RepoStore,
    payload: serde_json::Value,
) -> Result<()> {
    let payload: RepoPurgePayload =
        serde_json::from_value(payload).map_err(|e| Error::BadPayload(e.to_string()))?;
    store.purge(hubcore_storage::RepositoryId::from_uuid(payload.repository_id))?;
    Ok(())
}
