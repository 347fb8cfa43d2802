use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::inference::error::{InferenceError, InferenceResult};
use crate::inference::frame::FrameSource;
use crate::inference::model::{LoadProgress, VisionModel};
use crate::inference::pacing::{LatencyTracker, PartialThrottle};

/// Pacing parameters for the inference loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Minimum spacing between partial-result callbacks
    pub partial_interval: Duration,
    /// Number of recent latencies in the rolling average
    pub latency_window: usize,
    /// Lower bound of the dynamic delay
    pub min_delay: Duration,
    /// Upper bound of the dynamic delay
    pub max_delay: Duration,
    /// Delay used before any latency has been observed
    pub initial_delay: Duration,
    /// Wait after a failed inference before the next attempt
    pub error_cooldown: Duration,
    /// Poll interval while an inference is in flight
    pub busy_poll: Duration,
}

impl PacingConfig {
    /// Replace the initial delay, typically with the performance tier's
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    fn bound(&self, delay: Duration) -> Duration {
        delay.max(self.min_delay).min(self.max_delay)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            partial_interval: Duration::from_millis(100),
            latency_window: 8,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
            initial_delay: Duration::from_millis(1000),
            error_cooldown: Duration::from_millis(2000),
            busy_poll: Duration::from_millis(50),
        }
    }
}

/// Counters describing coordinator activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferenceStats {
    /// Inferences that produced a result
    pub completed: u64,
    /// Calls rejected because another inference was in flight
    pub dropped: u64,
    /// Inferences that failed
    pub failed: u64,
    /// Duration of the most recent completed inference
    pub last_latency: Option<Duration>,
}

/// Releases the single-flight flag when the call finishes or is dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight inference coordinator
///
/// At most one inference runs at any instant. A call arriving while another
/// is in flight returns an empty string immediately; the frame is dropped
/// rather than queued. Observed latencies feed `dynamic_delay`, which the
/// capture loop uses as its pacing interval.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use lookout_lib::inference::{InferenceCoordinator, PacingConfig};
/// use lookout_lib::sim::{ScriptedModel, StaticFrameSource};
///
/// #[tokio::main]
/// async fn main() {
///     let model = ScriptedModel::new(["a", " cat"]).preloaded();
///     let coordinator = InferenceCoordinator::new(Arc::new(model), PacingConfig::default());
///
///     let text = coordinator
///         .run_once(&StaticFrameSource::jpeg(), "Describe", |partial| println!("{partial}"))
///         .await
///         .unwrap();
///     println!("final: {text}");
/// }
/// ```
pub struct InferenceCoordinator {
    model: Arc<dyn VisionModel>,
    config: PacingConfig,
    busy: AtomicBool,
    latency: Mutex<LatencyTracker>,
    stats: Mutex<InferenceStats>,
}

impl InferenceCoordinator {
    pub fn new(model: Arc<dyn VisionModel>, config: PacingConfig) -> Self {
        Self {
            model,
            latency: Mutex::new(LatencyTracker::new(config.latency_window)),
            config,
            busy: AtomicBool::new(false),
            stats: Mutex::new(InferenceStats::default()),
        }
    }

    /// Load the model, forwarding progress
    ///
    /// # Errors
    /// Returns [`InferenceError::ModelLoad`] when the backend fails.
    pub async fn load(
        &self,
        on_progress: &(dyn Fn(LoadProgress) + Send + Sync),
    ) -> InferenceResult<()> {
        info!("Loading vision model");
        let started = Instant::now();

        self.model.load(on_progress).await.map_err(|e| match e {
            InferenceError::ModelLoad(_) => e,
            other => InferenceError::ModelLoad(other.to_string()),
        })?;

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Vision model loaded");
        Ok(())
    }

    /// Run the warmup pass
    ///
    /// # Errors
    /// Returns [`InferenceError::Warmup`] when the backend fails.
    pub async fn warmup(&self) -> InferenceResult<()> {
        if !self.model.is_loaded() {
            return Err(InferenceError::NotLoaded);
        }

        debug!("Warming up vision model");
        self.model.warmup().await.map_err(|e| match e {
            InferenceError::Warmup(_) => e,
            other => InferenceError::Warmup(other.to_string()),
        })?;

        info!("Vision model warm");
        Ok(())
    }

    /// Capture a frame and caption it
    ///
    /// Partial text (accumulated so far) is passed to `on_partial` at most
    /// once per `partial_interval`. Returns an empty string without waiting
    /// if an inference is already in flight, or if no frame is available.
    ///
    /// # Errors
    /// - [`InferenceError::NotLoaded`] - the model has not been loaded
    /// - [`InferenceError::Generation`] - the backend failed on this frame
    pub async fn run_once<F>(
        &self,
        source: &dyn FrameSource,
        instruction: &str,
        mut on_partial: F,
    ) -> InferenceResult<String>
    where
        F: FnMut(&str) + Send,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            lock(&self.stats).dropped += 1;
            debug!("Inference in flight, dropping frame");
            return Ok(String::new());
        }
        let _busy = BusyGuard(&self.busy);

        if !self.model.is_loaded() {
            return Err(InferenceError::NotLoaded);
        }

        let Some(frame) = source.capture_frame() else {
            debug!("No frame available");
            return Ok(String::new());
        };

        let started = Instant::now();
        let mut throttle = PartialThrottle::new(self.config.partial_interval);
        let mut accumulated = String::new();
        let mut on_token = |token: &str| {
            accumulated.push_str(token);
            if throttle.try_acquire() {
                on_partial(&accumulated);
            }
        };

        match self.model.generate(&frame, instruction, &mut on_token).await {
            Ok(text) => {
                let latency = started.elapsed();
                lock(&self.latency).record(latency);
                {
                    let mut stats = lock(&self.stats);
                    stats.completed += 1;
                    stats.last_latency = Some(latency);
                }
                debug!(
                    latency_ms = latency.as_millis() as u64,
                    chars = text.len(),
                    "Inference completed"
                );
                Ok(text)
            }
            Err(e) => {
                lock(&self.stats).failed += 1;
                warn!(error = %e, "Inference failed");
                Err(match e {
                    InferenceError::Generation(_) | InferenceError::NotLoaded => e,
                    other => InferenceError::Generation(other.to_string()),
                })
            }
        }
    }

    /// Pacing interval for the capture loop
    ///
    /// The rolling average of recent latencies bounded to
    /// `[min_delay, max_delay]`, or the initial delay before any sample.
    pub fn dynamic_delay(&self) -> Duration {
        let average = lock(&self.latency).average();
        self.config
            .bound(average.unwrap_or(self.config.initial_delay))
    }

    /// Whether an inference is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_loaded()
    }

    pub fn stats(&self) -> InferenceStats {
        *lock(&self.stats)
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
