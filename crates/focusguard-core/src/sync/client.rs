//! HTTP client for the companion web app's sync endpoint.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::SyncError;
use crate::storage::InterventionRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body of `POST /api/sync`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload<'a> {
    pub user_id: &'a str,
    pub interventions: &'a [InterventionRecord],
    pub blocked_sites: &'a [String],
}

#[derive(Debug, Clone)]
pub struct SyncClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    user_id: String,
}

impl SyncClient {
    pub fn new(endpoint: Url, api_key: impl Into<String>, user_id: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            endpoint,
            api_key: api_key.into(),
            user_id: user_id.into(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Upload local records and the block list.
    ///
    /// # Errors
    /// Transport failures and non-2xx answers.
    pub async fn push(
        &self,
        interventions: &[InterventionRecord],
        blocked_sites: &[String],
    ) -> Result<(), SyncError> {
        let payload = SyncPayload {
            user_id: &self.user_id,
            interventions,
            blocked_sites,
        };
        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
