use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use url::Url;

use super::client::SyncClient;
use super::credentials;
use crate::clock::Clock;
use crate::error::SyncError;
use crate::storage::{RecordStore, SyncConfig};

/// kv key holding the RFC 3339 time of the last successful upload.
pub const LAST_SYNC_KEY: &str = "last_sync";

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SyncReport {
    Skipped { reason: String },
    Synced { interventions: usize, at: DateTime<Utc> },
    Failed { error: String },
}

pub struct SyncService {
    store: RecordStore,
    client: Result<SyncClient, SyncError>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<()>,
}

impl SyncService {
    pub fn new(store: RecordStore, client: SyncClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            client: Ok(client),
            clock,
            in_flight: Mutex::new(()),
        }
    }

    /// A service whose every sync is skipped with `reason`.
    pub fn unconfigured(store: RecordStore, reason: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            client: Err(SyncError::NotConfigured(reason.into())),
            clock,
            in_flight: Mutex::new(()),
        }
    }

    /// Build from config. The API key comes from `api_key` when given,
    /// otherwise from the environment or the keyring.
    pub fn from_config(
        store: RecordStore,
        config: &SyncConfig,
        api_key: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let endpoint = match config.endpoint.as_deref().filter(|e| !e.is_empty()) {
            Some(raw) => match Url::parse(raw) {
                Ok(url) => url,
                Err(e) => {
                    return Self::unconfigured(store, format!("invalid endpoint '{raw}': {e}"), clock)
                }
            },
            None => return Self::unconfigured(store, "sync.endpoint is not set", clock),
        };
        let Some(user_id) = config.user_id.clone().filter(|u| !u.is_empty()) else {
            return Self::unconfigured(store, "sync.user_id is not set", clock);
        };
        let Some(api_key) = api_key.or_else(credentials::api_key) else {
            return Self::unconfigured(store, "no API key configured", clock);
        };
        Self::new(store, SyncClient::new(endpoint, api_key, user_id), clock)
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_ok()
    }

    /// Upload everything once. Never returns an error: failures are logged
    /// and reported, and the local records are kept for the next attempt.
    pub async fn sync_once(&self) -> SyncReport {
        let client = match &self.client {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!("sync skipped: {e}");
                return SyncReport::Skipped {
                    reason: e.to_string(),
                };
            }
        };
        let Ok(_guard) = self.in_flight.try_lock() else {
            return SyncReport::Skipped {
                reason: "sync already in progress".into(),
            };
        };

        let loaded = async {
            let interventions = self.store.list_interventions(usize::MAX).await?;
            let blocked = self.store.blocked_list().await?;
            Ok::<_, crate::error::CoreError>((interventions, blocked))
        }
        .await;
        let (interventions, blocked) = match loaded {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("sync failed to read local data: {e}");
                return SyncReport::Failed {
                    error: e.to_string(),
                };
            }
        };

        if let Err(e) = client.push(&interventions, &blocked).await {
            tracing::warn!(endpoint = %client.endpoint(), "sync failed: {e}");
            return SyncReport::Failed {
                error: e.to_string(),
            };
        }

        // Only what was uploaded; records added meanwhile wait for next time.
        let ids: Vec<String> = interventions.iter().map(|r| r.id.clone()).collect();
        if let Err(e) = self.store.delete_interventions(&ids).await {
            tracing::warn!("failed to clear synced interventions: {e}");
        }
        let at = self.clock.now();
        if let Err(e) = self.store.kv_set(LAST_SYNC_KEY, &at.to_rfc3339()).await {
            tracing::warn!("failed to record sync time: {e}");
        }
        tracing::info!(interventions = interventions.len(), "synced with web app");
        SyncReport::Synced {
            interventions: interventions.len(),
            at,
        }
    }

    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.kv_get(LAST_SYNC_KEY).await.ok()??;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Sync every `period`, first after one full period.
    pub fn spawn_periodic(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.sync_once().await;
                tracing::debug!(?report, "periodic sync");
            }
        })
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("configured", &self.is_configured())
            .finish()
    }
}
