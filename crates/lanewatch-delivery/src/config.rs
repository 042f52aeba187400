//! Delivery pipeline configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::DeliveryError;

/// What `submit` does when the delivery queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Skip the remote call and write the job to local fallback storage.
    #[default]
    Fallback,
    /// Wait for queue capacity. Only valid from threads outside the async runtime.
    Block,
}

impl FromStr for OverflowPolicy {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fallback" => Ok(OverflowPolicy::Fallback),
            "block" => Ok(OverflowPolicy::Block),
            other => Err(DeliveryError::config(format!("unknown overflow policy: {other}"))),
        }
    }
}

/// Delivery pipeline configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Number of concurrent delivery workers
    pub workers: usize,
    /// Capacity of the submission queue
    pub queue_capacity: usize,
    /// Behaviour when the queue is full
    pub overflow: OverflowPolicy,
    /// Upper bound on draining in-flight jobs at shutdown
    pub shutdown_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            overflow: OverflowPolicy::Fallback,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl DeliveryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: std::env::var("DELIVERY_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.workers),
            queue_capacity: std::env::var("DELIVERY_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.queue_capacity),
            overflow: std::env::var("DELIVERY_OVERFLOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.overflow),
            shutdown_timeout: Duration::from_secs(
                std::env::var("DELIVERY_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}
