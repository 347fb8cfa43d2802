use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with tracing
///
/// This function sets up the tracing subscriber with the following configuration:
/// - Reads filter from RUST_LOG environment variable if available
/// - Falls back to "lookout=debug,warn" if RUST_LOG is not set
/// - Uses a formatted output layer
///
/// Calling it again after a subscriber is installed is a no-op, so tests and
/// embedders can call it freely.
///
/// # Example
///
/// ```no_run
/// use lookout_lib::utils::logging::init_logging;
///
/// init_logging();
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lookout=debug,warn"));

    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
    {
        tracing::info!("Lookout logging initialized");
    }
}
