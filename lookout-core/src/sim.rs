//! In-process simulated collaborators
//!
//! Stand-ins for the browser camera, the model runtime, the capability probe
//! and the video element. They back the unit and integration tests and the
//! `simulate_session` demo, and are scriptable: queue failures, add latency,
//! and inspect what the core asked for.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::camera::{
    CameraError, CameraPlatform, CameraResult, FacingMode, MediaStream, MediaTrack, TrackState,
    VideoConstraints, VideoDevice,
};
use crate::camera::stream::TrackSettings;
use crate::capability::{CapabilityDetector, CapabilityReport};
use crate::inference::{
    Frame, FrameFormat, FrameSource, InferenceError, InferenceResult, LoadProgress, VisionModel,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ========== Camera ==========

struct CameraInner {
    secure: AtomicBool,
    devices: Vec<VideoDevice>,
    failures: Mutex<VecDeque<CameraError>>,
    requests: Mutex<Vec<VideoConstraints>>,
    issued: Mutex<Vec<MediaStream>>,
    next_track: AtomicU64,
}

/// Simulated camera platform
///
/// Exposes a front ("sim-front") and a rear ("sim-rear") device. Every
/// request succeeds with a fresh single-track stream unless a failure has
/// been queued with [`SimulatedCamera::fail_next`].
#[derive(Clone)]
pub struct SimulatedCamera {
    inner: Arc<CameraInner>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CameraInner {
                secure: AtomicBool::new(true),
                devices: vec![
                    VideoDevice {
                        device_id: "sim-front".to_string(),
                        label: "Simulated Front Camera".to_string(),
                        facing_mode: Some(FacingMode::User),
                    },
                    VideoDevice {
                        device_id: "sim-rear".to_string(),
                        label: "Simulated Rear Camera".to_string(),
                        facing_mode: Some(FacingMode::Environment),
                    },
                ],
                failures: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                issued: Mutex::new(Vec::new()),
                next_track: AtomicU64::new(1),
            }),
        }
    }

    /// Report an insecure execution context
    pub fn insecure(self) -> Self {
        self.inner.secure.store(false, Ordering::SeqCst);
        self
    }

    /// Fail the next `get_user_media` call with `error`
    ///
    /// Failures queue up and are consumed one per call.
    pub fn fail_next(&self, error: CameraError) {
        lock(&self.inner.failures).push_back(error);
    }

    /// Constraints of every `get_user_media` call so far
    pub fn requests(&self) -> Vec<VideoConstraints> {
        lock(&self.inner.requests).clone()
    }

    /// Most recently issued stream
    pub fn last_stream(&self) -> Option<MediaStream> {
        lock(&self.inner.issued).last().cloned()
    }

    /// Simulate the device disappearing: end every live track issued so far
    pub fn unplug(&self) {
        for stream in lock(&self.inner.issued).iter() {
            for track in stream.tracks() {
                if track.state() == TrackState::Live {
                    track.end();
                }
            }
        }
    }

    fn device_for(&self, constraints: &VideoConstraints) -> Option<&VideoDevice> {
        let devices = &self.inner.devices;
        match (&constraints.device_id, constraints.facing_mode) {
            (Some(id), _) => devices.iter().find(|d| &d.device_id == id),
            (None, Some(facing)) => devices.iter().find(|d| d.facing_mode == Some(facing)),
            (None, None) => devices.first(),
        }
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraPlatform for SimulatedCamera {
    fn is_secure_context(&self) -> bool {
        self.inner.secure.load(Ordering::SeqCst)
    }

    async fn get_user_media(&self, constraints: &VideoConstraints) -> CameraResult<MediaStream> {
        lock(&self.inner.requests).push(constraints.clone());

        if let Some(error) = lock(&self.inner.failures).pop_front() {
            return Err(error);
        }

        let device = self.device_for(constraints).ok_or(CameraError::DeviceNotFound)?;
        let n = self.inner.next_track.fetch_add(1, Ordering::SeqCst);
        let track = MediaTrack::with_settings(
            format!("sim-track-{}", n),
            device.label.clone(),
            TrackSettings {
                device_id: Some(device.device_id.clone()),
                resolution: constraints.ideal_resolution,
                facing_mode: device.facing_mode,
            },
        );

        let stream = MediaStream::new(vec![track]);
        lock(&self.inner.issued).push(stream.clone());
        Ok(stream)
    }

    async fn enumerate_devices(&self) -> CameraResult<Vec<VideoDevice>> {
        Ok(self.inner.devices.clone())
    }
}

// ========== Model ==========

struct ModelInner {
    tokens: Vec<String>,
    token_delay: Mutex<Duration>,
    loaded: AtomicBool,
    load_failure: Mutex<Option<String>>,
    warmup_failure: Mutex<Option<String>>,
    generation_failures: Mutex<VecDeque<String>>,
    generate_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_concurrency: AtomicUsize,
}

/// Scripted vision model
///
/// Emits the same token sequence for every frame, optionally sleeping
/// between tokens. Tracks how many generations ran concurrently.
#[derive(Clone)]
pub struct ScriptedModel {
    inner: Arc<ModelInner>,
}

impl ScriptedModel {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(ModelInner {
                tokens: tokens.into_iter().map(Into::into).collect(),
                token_delay: Mutex::new(Duration::ZERO),
                loaded: AtomicBool::new(false),
                load_failure: Mutex::new(None),
                warmup_failure: Mutex::new(None),
                generation_failures: Mutex::new(VecDeque::new()),
                generate_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_concurrency: AtomicUsize::new(0),
            }),
        }
    }

    /// Start out already loaded
    pub fn preloaded(self) -> Self {
        self.inner.loaded.store(true, Ordering::SeqCst);
        self
    }

    /// Sleep before emitting each token
    pub fn with_token_delay(self, delay: Duration) -> Self {
        *lock(&self.inner.token_delay) = delay;
        self
    }

    pub fn fail_load(&self, message: impl Into<String>) {
        *lock(&self.inner.load_failure) = Some(message.into());
    }

    pub fn fail_warmup(&self, message: impl Into<String>) {
        *lock(&self.inner.warmup_failure) = Some(message.into());
    }

    /// Fail the next generation; failures queue up
    pub fn fail_next_generation(&self, message: impl Into<String>) {
        lock(&self.inner.generation_failures).push_back(message.into());
    }

    /// Number of `generate` calls that reached the model
    pub fn generate_calls(&self) -> usize {
        self.inner.generate_calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `generate` calls observed
    pub fn peak_concurrency(&self) -> usize {
        self.inner.peak_concurrency.load(Ordering::SeqCst)
    }

    /// Text produced for every frame
    pub fn caption(&self) -> String {
        self.inner.tokens.concat()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VisionModel for ScriptedModel {
    fn is_loaded(&self) -> bool {
        self.inner.loaded.load(Ordering::SeqCst)
    }

    async fn load(&self, on_progress: &(dyn Fn(LoadProgress) + Send + Sync)) -> InferenceResult<()> {
        on_progress(LoadProgress::new(0.0).with_message("fetching weights"));

        let failure = lock(&self.inner.load_failure).take();
        if let Some(message) = failure {
            return Err(InferenceError::ModelLoad(message));
        }

        on_progress(LoadProgress::new(0.5).with_message("compiling shaders"));
        tokio::task::yield_now().await;
        on_progress(LoadProgress::new(1.0));

        self.inner.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn warmup(&self) -> InferenceResult<()> {
        tokio::task::yield_now().await;
        let failure = lock(&self.inner.warmup_failure).take();
        match failure {
            Some(message) => Err(InferenceError::Warmup(message)),
            None => Ok(()),
        }
    }

    async fn generate(
        &self,
        _frame: &Frame,
        _instruction: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> InferenceResult<String> {
        self.inner.generate_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_concurrency.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.inner.in_flight);

        let failure = lock(&self.inner.generation_failures).pop_front();
        if let Some(message) = failure {
            return Err(InferenceError::Generation(message));
        }

        let delay = *lock(&self.inner.token_delay);
        for token in &self.inner.tokens {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            on_token(token);
        }

        Ok(self.caption())
    }
}

// ========== Capability ==========

/// Capability detector returning a fixed report
#[derive(Debug, Clone)]
pub struct StaticCapability {
    report: CapabilityReport,
}

impl StaticCapability {
    pub fn new(report: CapabilityReport) -> Self {
        Self { report }
    }
}

#[async_trait]
impl CapabilityDetector for StaticCapability {
    async fn detect(&self) -> CapabilityReport {
        self.report.clone()
    }
}

// ========== Frames ==========

/// Frame source that always returns the same frame, or none
#[derive(Debug, Clone)]
pub struct StaticFrameSource {
    frame: Option<Frame>,
}

impl StaticFrameSource {
    pub fn new(frame: Option<Frame>) -> Self {
        Self { frame }
    }

    /// A tiny JPEG-tagged frame
    pub fn jpeg() -> Self {
        Self::new(Some(Frame::new(
            2,
            2,
            FrameFormat::Jpeg,
            vec![0xff, 0xd8, 0xff, 0xd9],
        )))
    }

    /// No frame available
    pub fn empty() -> Self {
        Self::new(None)
    }
}

impl FrameSource for StaticFrameSource {
    fn capture_frame(&self) -> Option<Frame> {
        self.frame.clone()
    }
}
