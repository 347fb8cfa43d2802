use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::camera::constraints::{FacingMode, VideoConstraints};
use crate::camera::error::CameraResult;
use crate::camera::stream::MediaStream;

/// A video input device as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDevice {
    /// Stable device ID
    pub device_id: String,
    /// Human readable label (may be empty before permission is granted)
    pub label: String,
    /// Facing mode, when the platform reports one
    pub facing_mode: Option<FacingMode>,
}

/// Platform media access
///
/// Implemented by the browser bindings in production and by
/// [`crate::sim::SimulatedCamera`] in tests. Implementations translate their
/// native exceptions with [`crate::camera::CameraError::from_dom_name`].
#[async_trait]
pub trait CameraPlatform: Send + Sync {
    /// Whether the execution context allows camera access at all
    fn is_secure_context(&self) -> bool {
        true
    }

    /// Request a stream matching the constraints
    ///
    /// May suspend on a user permission prompt.
    async fn get_user_media(&self, constraints: &VideoConstraints) -> CameraResult<MediaStream>;

    /// List video input devices
    async fn enumerate_devices(&self) -> CameraResult<Vec<VideoDevice>>;
}
