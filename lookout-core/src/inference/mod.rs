//! Inference coordination
//!
//! This module paces vision-language model inference over live frames:
//! - Single-flight execution (concurrent calls are dropped, not queued)
//! - Throttled streaming of partial results
//! - Dynamic pacing from a rolling average of observed latencies
//!
//! The model itself is an external collaborator behind [`VisionModel`].

/// Single-flight coordinator and pacing configuration
pub mod coordinator;

/// Error types for inference operations
pub mod error;

/// Frame capture types
pub mod frame;

/// Model backend trait
pub mod model;

/// Latency tracking and partial-result throttling
pub mod pacing;

pub use coordinator::{InferenceCoordinator, InferenceStats, PacingConfig};
pub use error::{InferenceError, InferenceResult};
pub use frame::{Frame, FrameFormat, FrameSource};
pub use model::{LoadProgress, VisionModel};
pub use pacing::{LatencyTracker, PartialThrottle};
