//! Remote ingestion endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{SecondsFormat, Utc};
use lanewatch_models::{IngestPayload, TrafficEvent};
use reqwest::Client;
use tracing::debug;

use crate::error::{DeliveryError, DeliveryResult};

/// Something that can deliver an ingestion payload to the remote service.
///
/// The delivery workers only see this trait; tests plug in fakes.
#[async_trait]
pub trait EventSender: Send + Sync {
    /// Attempt one delivery. No retries.
    async fn send(&self, payload: &IngestPayload) -> DeliveryResult<()>;
}

/// Build the wire payload for an event and its JPEG snapshot.
pub fn build_payload(event: &TrafficEvent, jpeg: &[u8]) -> IngestPayload {
    IngestPayload {
        detection_data: event.clone(),
        snapshot: STANDARD.encode(jpeg),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    }
}

/// Configuration for the ingestion client.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Full URL of the ingestion endpoint
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/vehicle-detection".to_string(),
            timeout: Duration::from_secs(1),
        }
    }
}

impl IngestConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("INGEST_URL")
                .unwrap_or_else(|_| "http://localhost:8000/vehicle-detection".to_string()),
            timeout: Duration::from_millis(
                std::env::var("INGEST_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
        }
    }
}

/// HTTP client for the ingestion endpoint.
pub struct IngestClient {
    http: Client,
    config: IngestConfig,
}

impl IngestClient {
    /// Create a new ingestion client.
    pub fn new(config: IngestConfig) -> DeliveryResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DeliveryError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> DeliveryResult<Self> {
        Self::new(IngestConfig::from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl EventSender for IngestClient {
    async fn send(&self, payload: &IngestPayload) -> DeliveryResult<()> {
        debug!(
            track_id = %payload.detection_data.track_id,
            "Posting event to {}",
            self.config.endpoint
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(self.config.timeout.as_millis() as u64)
                } else {
                    DeliveryError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::from_http_status(status.as_u16(), body))
    }
}
