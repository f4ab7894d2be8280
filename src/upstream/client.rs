//! HTTP client for the two upstream JSON endpoints (spec.md §4.1).

use std::time::Duration;

use chrono::Utc;
use tracing::{instrument, warn};

use super::normalize::normalize_snapshot;
use super::snapshot::{RawSnapshot, RawTransceiverGroup, Snapshot};
use crate::config::Config;

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    snapshot_url: String,
    transceivers_url: String,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self {
            http,
            snapshot_url: config.snapshot_url.clone(),
            transceivers_url: config.transceivers_url.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_urls(snapshot_url: String, transceivers_url: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder().timeout(timeout).build().unwrap(),
            snapshot_url,
            transceivers_url,
        }
    }

    /// Fetch and normalize one snapshot. Never returns an error: timeouts,
    /// non-2xx responses, and malformed JSON are logged and yield an empty
    /// (or partially empty) snapshot so the pipeline always has something
    /// to hand to the next stage (spec.md §4.1, "Failure semantics").
    #[instrument(skip(self))]
    pub async fn fetch_snapshot(&self) -> Snapshot {
        let now = Utc::now();

        let raw_snapshot = match self.fetch_json::<RawSnapshot>(&self.snapshot_url).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed; yielding empty snapshot for this tick");
                RawSnapshot {
                    pilots: Vec::new(),
                    controllers: Vec::new(),
                    general: Default::default(),
                }
            }
        };

        // Transceiver failure is tolerated independently of the main snapshot.
        let raw_transceivers = match self
            .fetch_json::<Vec<RawTransceiverGroup>>(&self.transceivers_url)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "transceivers fetch failed; proceeding with empty transceiver list");
                Vec::new()
            }
        };

        normalize_snapshot(raw_snapshot, raw_transceivers, now)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, crate::error::CoreError> {
        let response = self.http.get(url).send().await.map_err(|e| {
            crate::error::CoreError::UpstreamUnavailable(format!("{url}: {e}"))
        })?;

        if !response.status().is_success() {
            return Err(crate::error::CoreError::UpstreamUnavailable(format!(
                "{url}: status {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| crate::error::CoreError::UpstreamMalformed(format!("{url}: {e}")))
    }
}
