use thiserror::Error;

use crate::recovery::ErrorKind;

/// Inference-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// `run_once` was called before the model finished loading
    #[error("Model is not loaded")]
    NotLoaded,

    /// The model pipeline failed to initialize
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// The warmup pass failed
    #[error("Warmup failed: {0}")]
    Warmup(String),

    /// A single generation failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The frame could not be encoded
    #[error("Frame encoding failed: {0}")]
    Encoding(String),
}

impl InferenceError {
    /// Map to the recovery taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModelLoad(_) | Self::NotLoaded => ErrorKind::ModelLoad,
            Self::Warmup(_) => ErrorKind::Warmup,
            Self::Generation(_) | Self::Encoding(_) => ErrorKind::Inference,
        }
    }

    /// Whether the error is confined to a single call
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Generation(_) | Self::Encoding(_))
    }
}

/// Result type for inference operations
pub type InferenceResult<T> = Result<T, InferenceError>;
