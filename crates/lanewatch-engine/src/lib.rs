//! Frame-by-frame traffic event engine.
//!
//! This crate provides:
//! - Scene and runtime configuration
//! - The shared track registry (speed history, capture records, lane counters)
//! - The one-shot capture gate and snapshot cropping
//! - The CSV event log
//! - The frame processor tying classification, speed, capture and delivery together

pub mod capture;
pub mod config;
pub mod error;
pub mod event_log;
pub mod frame;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod registry;
pub mod snapshot;

pub use capture::CaptureGate;
pub use config::{Calibration, EngineConfig, SceneConfig};
pub use error::{EngineError, EngineResult};
pub use event_log::EventLog;
pub use frame::{FrameInput, FrameReader};
pub use logging::TrackLogger;
pub use processor::{FrameProcessor, FrameReport, ProcessorParts};
pub use registry::{LaneCounters, LaneTotals, RegistrySnapshot, TrackRegistry};
pub use snapshot::extract_snapshot;
