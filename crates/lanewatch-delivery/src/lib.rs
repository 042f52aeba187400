//! Reliable delivery of captured traffic events.
//!
//! This crate provides:
//! - HTTP client for the remote ingestion endpoint
//! - Durable local fallback storage (atomic writes)
//! - Bounded queue feeding a fixed pool of delivery workers
//! - Opt-in replay of locally stored events
//! - Delivery metrics
//!
//! Every submitted job ends in exactly one terminal outcome: delivered
//! remotely, persisted locally, or (only when the disk write itself fails)
//! lost and reported.

pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod pipeline;
pub mod replay;
pub mod snapshot;

pub use client::{build_payload, EventSender, IngestClient, IngestConfig};
pub use config::{DeliveryConfig, OverflowPolicy};
pub use error::{DeliveryError, DeliveryResult};
pub use fallback::{FallbackRecord, FallbackStore};
pub use pipeline::{
    DeliveryJob, DeliveryOutcome, DeliveryPipeline, DeliveryReport, DeliveryStats, JobSink,
    SubmitOutcome,
};
pub use replay::{replay_stored, ReplaySummary};
pub use snapshot::Snapshot;
