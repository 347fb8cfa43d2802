/// Camera stream acquisition, monitoring and recovery
pub mod camera;

/// Hardware capability detection
pub mod capability;

/// Inference coordination and pacing
pub mod inference;

/// Error states and recovery guidance
pub mod recovery;

/// Live captioning session (composition root)
pub mod session;

/// Simulated collaborators for tests and demos
pub mod sim;

/// Application state machine and configuration
pub mod state;

/// Utility modules
pub mod utils;
