//! `ci.trigger` handler: notifies an external CI system of a push, the same
//! fire-and-forget shape as webhook delivery but against a fixed endpoint
//! contract rather than a tenant-configured URL.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Serialize)]
pub struct CiTriggerPayload {
    pub ci_url: String,
    pub repository_id: uuid::Uuid,
    pub ref_name: String,
    pub commit_oid: String,
    pub token: Option<String>,
}

pub async fn handle(client: &reqwest::Client, payload: serde_json::Value) -> Result<()> {
    let payload: CiTriggerPayload =
        serde_json::from_value(payload).map_err(|e| Error::BadPayload(e.to_string()))?;

    let mut request = client.post(&payload.ci_url).json(&payload);
    if let Some(token) = &payload.token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(Error::Handler(format!(
            "CI endpoint returned {}",
            response.status()
        )));
    }
    Ok(())
}
