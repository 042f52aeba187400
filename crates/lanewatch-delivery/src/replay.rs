//! Re-send events held in local fallback storage.

use tracing::{info, warn};

use crate::client::{build_payload, EventSender};
use crate::error::DeliveryResult;
use crate::fallback::FallbackStore;
use crate::snapshot::Snapshot;

/// Result of one replay sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Try each stored record once. Delivered records are removed; anything that
/// fails stays on disk for the next sweep.
///
/// Records whose image is empty (a snapshot that could not be encoded) are
/// never sent and stay on disk.
pub async fn replay_stored(store: &FallbackStore, sender: &dyn EventSender) -> DeliveryResult<ReplaySummary> {
    let records = store.list().await?;
    let mut summary = ReplaySummary::default();

    for record in records {
        summary.attempted += 1;

        let (event, jpeg) = match store.load(&record).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(record = %record.stem, error = %e, "Skipping unreadable fallback record");
                summary.failed += 1;
                continue;
            }
        };

        let jpeg = match Snapshot::from_jpeg(jpeg).and_then(|snapshot| snapshot.to_jpeg()) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!(record = %record.stem, error = %e, "Fallback record has no usable snapshot, keeping it");
                summary.failed += 1;
                continue;
            }
        };

        match sender.send(&build_payload(&event, &jpeg)).await {
            Ok(()) => {
                if let Err(e) = store.remove(&record).await {
                    warn!(record = %record.stem, error = %e, "Delivered but could not remove record");
                }
                summary.delivered += 1;
            }
            Err(e) => {
                warn!(record = %record.stem, error = %e, "Replay delivery failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        attempted = summary.attempted,
        delivered = summary.delivered,
        failed = summary.failed,
        "Replay sweep finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use lanewatch_models::{BoundingBox, LaneAssignment, SpeedReading, TrackedDetection, TrafficEvent};
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::client::{IngestClient, IngestConfig};

    fn event(track: u64) -> TrafficEvent {
        let det = TrackedDetection::new(track, BoundingBox::new(0.0, 0.0, 4.0, 4.0), "truck", 0.8);
        TrafficEvent::new(&det, &LaneAssignment::Violation, SpeedReading::Unknown, Utc::now())
    }

    fn client(server: &MockServer) -> IngestClient {
        IngestClient::new(IngestConfig {
            endpoint: format!("{}/vehicle-detection", server.uri()),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_replay_removes_delivered_records() {
        let dir = TempDir::new().unwrap();
        let store = FallbackStore::new(dir.path());
        store.persist(&event(1), b"one").await.unwrap();
        store.persist(&event(2), b"two").await.unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let summary = replay_stored(&store, &client(&server)).await.unwrap();

        assert_eq!(summary, ReplaySummary { attempted: 2, delivered: 2, failed: 0 });
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_keeps_failed_records() {
        let dir = TempDir::new().unwrap();
        let store = FallbackStore::new(dir.path());
        store.persist(&event(1), b"one").await.unwrap();
        store.persist(&event(2), b"two").await.unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "detection_data": { "track_id": 1 } })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let summary = replay_stored(&store, &client(&server)).await.unwrap();

        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.failed, 1);
        let left = store.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].stem.starts_with("vehicle_2_"));
    }

    #[tokio::test]
    async fn test_replay_skips_records_without_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = FallbackStore::new(dir.path());
        store.persist(&event(1), &[]).await.unwrap();
        store.persist(&event(2), b"two").await.unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "detection_data": { "track_id": 2 } })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let summary = replay_stored(&store, &client(&server)).await.unwrap();

        assert_eq!(summary, ReplaySummary { attempted: 2, delivered: 1, failed: 1 });
        let left = store.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].stem.starts_with("vehicle_1_"));
        assert!(left[0].image_path.exists());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_ne!(body["snapshot"], "");
    }

    #[tokio::test]
    async fn test_replay_of_empty_store() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let summary = replay_stored(&FallbackStore::new(dir.path()), &client(&server)).await.unwrap();
        assert_eq!(summary, ReplaySummary::default());
    }
}
