use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::select_all;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::camera::backoff::BackoffPolicy;
use crate::camera::constraints::{Resolution, VideoConstraints};
use crate::camera::error::{CameraError, CameraResult};
use crate::camera::platform::{CameraPlatform, VideoDevice};
use crate::camera::stream::{MediaStream, TrackState};

/// Capacity of the camera event channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Notifications emitted by the stream manager
#[derive(Debug, Clone)]
pub enum CameraEvent {
    /// A track of the current stream terminated without being stopped
    TrackEnded { stream_id: String, track_id: String },

    /// A recovery attempt is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },

    /// Recovery succeeded with a fresh stream
    Reconnected { stream: MediaStream },

    /// Recovery gave up; no further automatic attempts will be made
    RecoveryFailed {
        attempts: u32,
        error: Option<CameraError>,
    },
}

/// Stream manager settings
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Resolution requested at the strictest constraint level
    pub ideal_resolution: Resolution,
    /// Whether to reacquire automatically when a track ends
    pub auto_recover: bool,
    /// Delays and attempt cap for recovery
    pub backoff: BackoffPolicy,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            ideal_resolution: Resolution::default(),
            auto_recover: true,
            backoff: BackoffPolicy::default(),
        }
    }
}

struct ManagerInner {
    platform: Arc<dyn CameraPlatform>,
    settings: CameraSettings,
    prefer_front_facing: AtomicBool,
    current: Mutex<Option<MediaStream>>,
    /// Dropping the sender cancels the running monitor
    monitor_stop: Mutex<Option<watch::Sender<bool>>>,
    attempts: AtomicU32,
    events: broadcast::Sender<CameraEvent>,
}

/// Camera stream manager
///
/// Acquires camera streams with constraint fallback, watches their tracks,
/// and reacquires with exponential backoff when the platform terminates a
/// track. Ownership of an acquired stream passes to the caller (the state
/// machine); the manager keeps a handle only to monitor and release it.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use lookout_lib::camera::{CameraSettings, CameraStreamManager};
/// use lookout_lib::sim::SimulatedCamera;
///
/// #[tokio::main]
/// async fn main() {
///     let manager = CameraStreamManager::new(
///         Arc::new(SimulatedCamera::new()),
///         CameraSettings::default(),
///     );
///     let stream = manager.acquire(true).await.unwrap();
///     println!("Acquired {}", stream.id());
///     manager.release();
/// }
/// ```
#[derive(Clone)]
pub struct CameraStreamManager {
    inner: Arc<ManagerInner>,
}

impl CameraStreamManager {
    /// Create a new manager on top of a platform backend
    pub fn new(platform: Arc<dyn CameraPlatform>, settings: CameraSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                platform,
                settings,
                prefer_front_facing: AtomicBool::new(true),
                current: Mutex::new(None),
                monitor_stop: Mutex::new(None),
                attempts: AtomicU32::new(0),
                events,
            }),
        }
    }

    /// Acquire a camera stream
    ///
    /// Tries the ideal resolution with the preferred facing mode, then the
    /// facing mode alone, then any camera. The first success wins and the
    /// recovery counter resets to zero.
    ///
    /// # Errors
    /// Returns the error of the last attempted level. Permission and
    /// secure-context failures stop the ladder immediately.
    pub async fn acquire(&self, prefer_front_facing: bool) -> CameraResult<MediaStream> {
        self.inner
            .prefer_front_facing
            .store(prefer_front_facing, Ordering::Relaxed);

        let stream = self.inner.open(prefer_front_facing).await?;
        self.inner.install(&stream);

        Ok(stream)
    }

    /// Switch to a specific device
    ///
    /// Stops the current stream first. Explicit switches do not take part in
    /// the recovery backoff cycle.
    ///
    /// # Errors
    /// Returns `CameraError::DeviceSwitchFailed` if the device cannot be opened.
    pub async fn switch_device(&self, device_id: &str) -> CameraResult<MediaStream> {
        info!(device_id = %device_id, "Switching camera device");
        self.release();

        let constraints = VideoConstraints::for_device(device_id);
        let stream = self
            .inner
            .platform
            .get_user_media(&constraints)
            .await
            .map_err(|e| CameraError::DeviceSwitchFailed {
                device_id: device_id.to_string(),
                reason: e.to_string(),
            })?;

        self.inner.install(&stream);
        Ok(stream)
    }

    /// Stop all tracks of the current stream
    ///
    /// Cancels monitoring and any pending recovery. Idempotent.
    pub fn release(&self) {
        self.inner.cancel_monitor();
        if let Some(stream) = lock(&self.inner.current).take() {
            info!(stream_id = %stream.id(), "Releasing camera stream");
            stream.stop_all();
        }
    }

    /// List video input devices
    pub async fn list_devices(&self) -> CameraResult<Vec<VideoDevice>> {
        self.inner.platform.enumerate_devices().await
    }

    /// Stream currently held by the manager
    pub fn current_stream(&self) -> Option<MediaStream> {
        lock(&self.inner.current).clone()
    }

    /// Failed recovery attempts since the last successful acquisition
    pub fn recovery_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Subscribe to camera events
    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.inner.events.subscribe()
    }

    /// Whether the platform context allows camera access
    pub fn is_secure_context(&self) -> bool {
        self.inner.platform.is_secure_context()
    }
}

impl ManagerInner {
    /// Run the constraint fallback ladder
    async fn open(&self, prefer_front_facing: bool) -> CameraResult<MediaStream> {
        if !self.platform.is_secure_context() {
            warn!("Camera requested from an insecure context");
            return Err(CameraError::InsecureContext);
        }

        let ladder =
            VideoConstraints::fallback_ladder(prefer_front_facing, self.settings.ideal_resolution);
        let mut last_error = CameraError::DeviceNotFound;

        for (level, constraints) in ladder {
            debug!(level = ?level, "Requesting camera stream");
            match self.platform.get_user_media(&constraints).await {
                Ok(stream) => {
                    info!(level = ?level, stream_id = %stream.id(), "Camera stream acquired");
                    return Ok(stream);
                }
                Err(e) if e.is_terminal() => {
                    warn!(level = ?level, error = %e, "Camera request failed, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    warn!(level = ?level, error = %e, "Camera request failed, relaxing constraints");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Take ownership of a freshly acquired stream and start monitoring it
    fn install(self: &Arc<Self>, stream: &MediaStream) {
        self.cancel_monitor();

        if let Some(previous) = lock(&self.current).replace(stream.clone()) {
            if previous != *stream {
                previous.stop_all();
            }
        }
        self.attempts.store(0, Ordering::SeqCst);

        let (stop_tx, stop_rx) = watch::channel(false);
        *lock(&self.monitor_stop) = Some(stop_tx);

        let inner = Arc::clone(self);
        let stream = stream.clone();
        tokio::spawn(async move {
            inner.monitor(stream, stop_rx).await;
        });
    }

    fn cancel_monitor(&self) {
        if lock(&self.monitor_stop).take().is_some() {
            debug!("Camera monitor cancelled");
        }
    }

    /// Wait for the first track to leave the live state
    async fn monitor(self: Arc<Self>, stream: MediaStream, mut stop_rx: watch::Receiver<bool>) {
        if stream.tracks().is_empty() {
            return;
        }

        let waiters = stream.tracks().iter().map(|track| {
            let track = track.clone();
            Box::pin(async move {
                let state = track.ended().await;
                (state, track.id().to_string())
            })
        });

        let (state, track_id) = tokio::select! {
            _ = stop_rx.changed() => return,
            ((state, track_id), _, _) = select_all(waiters) => (state, track_id),
        };

        if state != TrackState::Ended {
            debug!(stream_id = %stream.id(), "Stream stopped by owner, monitor exiting");
            return;
        }

        self.recover(stream, track_id, stop_rx).await;
    }

    /// Reacquire with exponential backoff until success or the attempt cap
    async fn recover(
        self: Arc<Self>,
        lost: MediaStream,
        track_id: String,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        warn!(stream_id = %lost.id(), track_id = %track_id, "Camera track ended unexpectedly");
        lost.stop_all();
        let _ = self.events.send(CameraEvent::TrackEnded {
            stream_id: lost.id().to_string(),
            track_id,
        });

        if !self.settings.auto_recover {
            info!("Auto-recovery disabled");
            let _ = self.events.send(CameraEvent::RecoveryFailed {
                attempts: self.attempts.load(Ordering::SeqCst),
                error: None,
            });
            return;
        }

        let policy = self.settings.backoff;
        let prefer_front_facing = self.prefer_front_facing.load(Ordering::Relaxed);
        let mut last_error = None;

        loop {
            let attempt = self.attempts.load(Ordering::SeqCst);
            if !policy.allows(attempt) {
                break;
            }

            let delay = policy.delay_for(attempt);
            info!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Scheduling camera recovery");
            let _ = self.events.send(CameraEvent::Reconnecting {
                attempt: attempt + 1,
                delay,
            });

            tokio::select! {
                _ = stop_rx.changed() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = self.open(prefer_front_facing).await;

            // Released while the platform call was in flight
            if !matches!(stop_rx.has_changed(), Ok(false)) {
                if let Ok(stream) = result {
                    stream.stop_all();
                }
                return;
            }

            match result {
                Ok(stream) => {
                    self.install(&stream);
                    info!(stream_id = %stream.id(), "Camera stream recovered");
                    let _ = self.events.send(CameraEvent::Reconnected { stream });
                    return;
                }
                Err(e) => {
                    let failed = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    warn!(attempt = failed, error = %e, "Camera recovery attempt failed");
                    last_error = Some(e);
                }
            }
        }

        if !matches!(stop_rx.has_changed(), Ok(false)) {
            return;
        }

        let attempts = self.attempts.load(Ordering::SeqCst);
        error!(attempts = attempts, "Camera recovery exhausted");
        lock(&self.current).take();
        *lock(&self.monitor_stop) = None;
        let _ = self.events.send(CameraEvent::RecoveryFailed {
            attempts,
            error: last_error,
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
