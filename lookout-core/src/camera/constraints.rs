use serde::{Deserialize, Serialize};

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front ("selfie") camera
    User,
    /// Rear camera
    Environment,
}

impl FacingMode {
    /// Pick the facing mode for a front-facing preference
    pub fn from_preference(prefer_front_facing: bool) -> Self {
        if prefer_front_facing {
            Self::User
        } else {
            Self::Environment
        }
    }
}

/// Capture resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// How strict a constraint set is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintLevel {
    /// Ideal resolution plus facing mode
    Ideal,
    /// Facing mode only
    FacingOnly,
    /// Any camera
    Any,
    /// Pinned to one device
    Device,
}

/// Video capture constraints passed to the platform
///
/// `ideal` values are hints the platform may relax; `device_id` is exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub facing_mode: Option<FacingMode>,
    pub ideal_resolution: Option<Resolution>,
    pub device_id: Option<String>,
}

impl VideoConstraints {
    /// No constraints at all
    pub fn any() -> Self {
        Self::default()
    }

    /// Facing mode only
    pub fn facing(facing_mode: FacingMode) -> Self {
        Self {
            facing_mode: Some(facing_mode),
            ..Self::default()
        }
    }

    /// Facing mode plus ideal resolution
    pub fn ideal(facing_mode: FacingMode, resolution: Resolution) -> Self {
        Self {
            facing_mode: Some(facing_mode),
            ideal_resolution: Some(resolution),
            device_id: None,
        }
    }

    /// Pinned to a single device
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    /// Constraint sets to try in order, strictest first
    ///
    /// Mobile browsers often reject resolution/facing combinations that
    /// desktops accept, so each level drops one requirement.
    pub fn fallback_ladder(
        prefer_front_facing: bool,
        resolution: Resolution,
    ) -> Vec<(ConstraintLevel, VideoConstraints)> {
        let facing = FacingMode::from_preference(prefer_front_facing);
        vec![
            (ConstraintLevel::Ideal, Self::ideal(facing, resolution)),
            (ConstraintLevel::FacingOnly, Self::facing(facing)),
            (ConstraintLevel::Any, Self::any()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_ladder_order() {
        let ladder = VideoConstraints::fallback_ladder(true, Resolution::new(640, 480));
        let levels: Vec<_> = ladder.iter().map(|(level, _)| *level).collect();
        assert_eq!(
            levels,
            vec![ConstraintLevel::Ideal, ConstraintLevel::FacingOnly, ConstraintLevel::Any]
        );

        assert_eq!(ladder[0].1.facing_mode, Some(FacingMode::User));
        assert_eq!(ladder[0].1.ideal_resolution, Some(Resolution::new(640, 480)));
        assert_eq!(ladder[1].1.ideal_resolution, None);
        assert_eq!(ladder[2].1, VideoConstraints::any());
    }

    #[test]
    fn test_rear_camera_preference() {
        let ladder = VideoConstraints::fallback_ladder(false, Resolution::default());
        assert_eq!(ladder[0].1.facing_mode, Some(FacingMode::Environment));
    }

    #[test]
    fn test_device_constraints() {
        let c = VideoConstraints::for_device("cam-2");
        assert_eq!(c.device_id.as_deref(), Some("cam-2"));
        assert!(c.facing_mode.is_none());
    }

    #[test]
    fn test_facing_mode_serialization() {
        assert_eq!(serde_json::to_string(&FacingMode::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&FacingMode::Environment).unwrap(),
            "\"environment\""
        );
    }
}
