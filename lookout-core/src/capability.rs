//! Hardware capability detection
//!
//! The detector runs once at startup; its report seeds the state machine's
//! static `has_capability` flag and the initial inference pacing.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Coarse performance tier of the accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Low,
    #[default]
    Medium,
    High,
}

impl PerformanceTier {
    /// Pacing delay to use before any inference latency has been observed
    pub fn initial_delay(&self) -> Duration {
        match self {
            Self::Low => Duration::from_millis(2000),
            Self::Medium => Duration::from_millis(1000),
            Self::High => Duration::from_millis(500),
        }
    }
}

/// Result of capability detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReport {
    /// Whether GPU acceleration is available
    pub supported: bool,
    /// Performance tier (meaningful only when supported)
    pub performance_tier: PerformanceTier,
    /// Why detection failed, for diagnostics
    pub reason: Option<String>,
}

impl CapabilityReport {
    /// Acceleration available at the given tier
    pub fn supported(performance_tier: PerformanceTier) -> Self {
        Self {
            supported: true,
            performance_tier,
            reason: None,
        }
    }

    /// Acceleration unavailable
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            supported: false,
            performance_tier: PerformanceTier::Low,
            reason: Some(reason.into()),
        }
    }
}

/// Probes the platform for GPU acceleration
#[async_trait]
pub trait CapabilityDetector: Send + Sync {
    /// Detect capability; never fails, an error is an unsupported report
    async fn detect(&self) -> CapabilityReport;
}
