//! C6 — Log Pipeline: chunked, best-effort exposure/assignment log shipping.

use crate::engine::LogSink;
use crate::types::{ClientSecret, WriteFlagLogsRequest};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

const CHUNK_SIZE: usize = 1000;
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Ships `WriteFlagLogsRequest` batches to the ingestion endpoint. Each
/// batch is split into `flag_assigned` chunks of at most 1000 entries; only
/// the first chunk carries `telemetry_data`/`client_resolve_info`/
/// `flag_resolve_info`. Sends are detached, tracked in a `JoinSet` so
/// `shutdown` can wait for all of them.
pub struct LogPipeline {
    client: reqwest::Client,
    ingestion_url: String,
    client_secret: ClientSecret,
    inflight: Mutex<JoinSet<()>>,
}

impl LogPipeline {
    pub fn new(client: reqwest::Client, ingestion_url: String, client_secret: ClientSecret) -> Self {
        Self {
            client,
            ingestion_url,
            client_secret,
            inflight: Mutex::new(JoinSet::new()),
        }
    }

    fn chunk(batch: WriteFlagLogsRequest) -> Vec<WriteFlagLogsRequest> {
        if batch.flag_assigned.len() <= CHUNK_SIZE {
            return vec![batch];
        }
        let WriteFlagLogsRequest {
            flag_assigned,
            client_resolve_info,
            flag_resolve_info,
            telemetry_data,
        } = batch;

        let mut chunks = Vec::new();
        for (i, slice) in flag_assigned.chunks(CHUNK_SIZE).enumerate() {
            if i == 0 {
                chunks.push(WriteFlagLogsRequest {
                    flag_assigned: slice.to_vec(),
                    client_resolve_info: client_resolve_info.clone(),
                    flag_resolve_info: flag_resolve_info.clone(),
                    telemetry_data: telemetry_data.clone(),
                });
            } else {
                chunks.push(WriteFlagLogsRequest {
                    flag_assigned: slice.to_vec(),
                    client_resolve_info: Vec::new(),
                    flag_resolve_info: Vec::new(),
                    telemetry_data: None,
                });
            }
        }
        chunks
    }

    async fn send_chunk(
        client: reqwest::Client,
        url: String,
        auth: String,
        chunk: WriteFlagLogsRequest,
    ) {
        let entries = chunk.flag_assigned.len();
        let result = client
            .post(&url)
            .header("authorization", auth)
            .timeout(SEND_TIMEOUT)
            .json(&chunk)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                info!(entries, "shipped exposure log chunk");
            }
            Ok(resp) => {
                error!(status = %resp.status(), entries, "exposure log chunk rejected");
            }
            Err(e) => {
                error!(error = %e, entries, "exposure log chunk send failed");
            }
        }
    }

    pub async fn shutdown(&self) {
        let mut inflight = self.inflight.lock().await;
        while inflight.join_next().await.is_some() {}
    }
}

#[async_trait]
impl LogSink for LogPipeline {
    #[instrument(skip(self, batch))]
    async fn write(&self, batch: WriteFlagLogsRequest) {
        if batch.is_empty() {
            debug!("dropping empty log batch");
            return;
        }
        let chunks = Self::chunk(batch);
        debug!(chunks = chunks.len(), "dispatching exposure log chunks");

        let auth = format!("ClientSecret {}", self.client_secret.as_str());
        let mut inflight = self.inflight.lock().await;
        for chunk in chunks {
            let client = self.client.clone();
            let url = self.ingestion_url.clone();
            let auth = auth.clone();
            inflight.spawn(Self::send_chunk(client, url, auth, chunk));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_under_threshold() {
        let batch = WriteFlagLogsRequest {
            flag_assigned: vec![serde_json::json!({"flag": "a"})],
            client_resolve_info: vec![serde_json::json!({"sdk": "rust"})],
            flag_resolve_info: vec![],
            telemetry_data: Some(serde_json::json!({"t": 1})),
        };
        let chunks = LogPipeline::chunk(batch);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].telemetry_data.is_some());
    }

    #[test]
    fn splits_into_chunks_of_1000_with_metadata_only_on_first() {
        let flag_assigned = (0..2500)
            .map(|i| serde_json::json!({"flag": i}))
            .collect();
        let batch = WriteFlagLogsRequest {
            flag_assigned,
            client_resolve_info: vec![serde_json::json!({"sdk": "rust"})],
            flag_resolve_info: vec![],
            telemetry_data: Some(serde_json::json!({"t": 1})),
        };
        let chunks = LogPipeline::chunk(batch);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].flag_assigned.len(), 1000);
        assert_eq!(chunks[1].flag_assigned.len(), 1000);
        assert_eq!(chunks[2].flag_assigned.len(), 500);
        assert!(chunks[0].telemetry_data.is_some());
        assert!(chunks[1].telemetry_data.is_none());
        assert!(chunks[2].client_resolve_info.is_empty());
    }
}
