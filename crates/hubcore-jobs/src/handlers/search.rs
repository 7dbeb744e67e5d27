//! `search.index` handler: pushes a repository's changed refs to the search
//! indexing service. The indexer itself lives outside this crate; this
//! handler only owns delivery and retry semantics.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchIndexPayload {
    pub index_url: String,
    pub repository_id: uuid::Uuid,
    pub ref_name: String,
    pub commit_oid: String,
}

pub async fn handle(client: &reqwest::Client, payload: serde_json::Value) -> Result<()> {
    let payload: SearchIndexPayload =
        serde_json::from_value(payload).map_err(|e| Error::BadPayload(e.to_string()))?;

    let response = client
        .post(&payload.index_url)
        .json(&payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Handler(format!(
            "search indexer returned {}",
            response.status()
        )));
    }
    Ok(())
}
