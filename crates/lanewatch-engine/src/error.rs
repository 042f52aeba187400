//! Engine error types.

use lanewatch_analysis::AnalysisError;
use lanewatch_delivery::DeliveryError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty snapshot crop: {0}")]
    EmptyCrop(String),

    #[error("Invalid frame input: {0}")]
    FrameInput(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn empty_crop(msg: impl Into<String>) -> Self {
        Self::EmptyCrop(msg.into())
    }

    pub fn frame_input(msg: impl Into<String>) -> Self {
        Self::FrameInput(msg.into())
    }

    /// Failures scoped to one detection; processing continues with the next.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::EmptyCrop(_) | EngineError::Image(_) | EngineError::Delivery(_)
        )
    }
}
