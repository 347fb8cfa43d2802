use thiserror::Error;

use crate::recovery::ErrorKind;

/// Camera-related errors
///
/// Platform backends map their native exceptions into these variants,
/// see [`CameraError::from_dom_name`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The user declined camera access
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    /// No video input device is present
    #[error("No camera device found")]
    DeviceNotFound,

    /// The device exists but is held by another process or unreadable
    #[error("Camera is in use or unreadable: {0}")]
    DeviceUnavailable(String),

    /// No device satisfies the requested capture constraints
    #[error("No camera satisfies the requested constraints: {0}")]
    ConstraintsNotSatisfied(String),

    /// Camera access requires a secure context
    #[error("Camera access requires a secure context (HTTPS or localhost)")]
    InsecureContext,

    /// Switching to a specific device failed
    #[error("Failed to switch to camera '{device_id}': {reason}")]
    DeviceSwitchFailed { device_id: String, reason: String },

    /// Any other platform failure
    #[error("Camera platform error ({name}): {message}")]
    Platform { name: String, message: String },
}

impl CameraError {
    /// Map a platform exception name (e.g. `NotAllowedError`) to an error
    ///
    /// Covers both the standard names and the legacy Chrome/Firefox aliases.
    pub fn from_dom_name(name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match name {
            "NotAllowedError" | "PermissionDeniedError" => Self::PermissionDenied(message),
            "NotFoundError" | "DevicesNotFoundError" => Self::DeviceNotFound,
            "NotReadableError" | "TrackStartError" | "AbortError" => {
                Self::DeviceUnavailable(message)
            }
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                Self::ConstraintsNotSatisfied(message)
            }
            "SecurityError" => Self::InsecureContext,
            _ => Self::Platform {
                name: name.to_string(),
                message,
            },
        }
    }

    /// Error kind used by the recovery policy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::Permission,
            Self::DeviceNotFound => ErrorKind::HardwareNotFound,
            Self::DeviceUnavailable(_) | Self::DeviceSwitchFailed { .. } => {
                ErrorKind::HardwareInUse
            }
            Self::ConstraintsNotSatisfied(_) => ErrorKind::Constraint,
            Self::InsecureContext => ErrorKind::Security,
            Self::Platform { .. } => ErrorKind::Unknown,
        }
    }

    /// Whether looser constraints cannot possibly help
    ///
    /// A declined prompt or an insecure context fails the same way for every
    /// constraint set, so the fallback ladder stops early.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::InsecureContext)
    }
}

/// Result type for camera operations
pub type CameraResult<T> = Result<T, CameraError>;
