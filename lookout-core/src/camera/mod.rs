/// Camera stream acquisition, monitoring and auto-recovery
pub mod manager;

/// Exponential backoff for recovery attempts
pub mod backoff;

/// Capture constraints and the fallback ladder
pub mod constraints;

/// Camera-related error types
pub mod error;

/// Platform media access abstraction
pub mod platform;

/// Media stream and track handles
pub mod stream;

// Re-export commonly used types
pub use backoff::BackoffPolicy;
pub use constraints::{ConstraintLevel, FacingMode, Resolution, VideoConstraints};
pub use error::{CameraError, CameraResult};
pub use manager::{CameraEvent, CameraSettings, CameraStreamManager};
pub use platform::{CameraPlatform, VideoDevice};
pub use stream::{MediaStream, MediaTrack, TrackState};
