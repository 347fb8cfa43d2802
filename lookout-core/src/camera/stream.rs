use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::debug;

use crate::camera::constraints::{FacingMode, Resolution};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Producing frames
    Live,
    /// Stopped by us (release, replacement, device switch)
    Stopped,
    /// Terminated by the platform without being asked to (unplugged, revoked)
    Ended,
}

/// Settings the platform actually applied to a track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackSettings {
    /// Device the track reads from
    pub device_id: Option<String>,
    /// Delivered resolution
    pub resolution: Option<Resolution>,
    /// Delivered facing mode
    pub facing_mode: Option<FacingMode>,
}

struct TrackInner {
    id: String,
    label: String,
    settings: TrackSettings,
    state: watch::Sender<TrackState>,
}

/// Handle to one video track of a camera stream
///
/// Cloning the handle shares the underlying track. Platform backends call
/// [`MediaTrack::end`] when the device goes away; application code calls
/// [`MediaTrack::stop`].
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create a live track
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with_settings(id, label, TrackSettings::default())
    }

    /// Create a live track with the applied settings
    pub fn with_settings(
        id: impl Into<String>,
        label: impl Into<String>,
        settings: TrackSettings,
    ) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                label: label.into(),
                settings,
                state,
            }),
        }
    }

    /// Track ID
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Human readable device label
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Applied settings
    pub fn settings(&self) -> &TrackSettings {
        &self.inner.settings
    }

    /// Current lifecycle state
    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    /// Check if the track is still producing frames
    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Stop the track
    ///
    /// Safe to call multiple times; a track that already ended stays ended.
    pub fn stop(&self) {
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Stopped;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(track_id = %self.inner.id, "Track stopped");
        }
    }

    /// Signal an unsolicited termination
    ///
    /// Called by platform backends. Has no effect on a track that was
    /// already stopped.
    pub fn end(&self) {
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Ended;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(track_id = %self.inner.id, "Track ended by platform");
        }
    }

    /// Wait until the track is no longer live
    ///
    /// Returns the terminal state, which tells a solicited stop apart from
    /// an unsolicited end.
    pub async fn ended(&self) -> TrackState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|state| *state != TrackState::Live).await {
            Ok(state) => *state,
            // The sender lives in `self`, so this is unreachable in practice
            Err(_) => TrackState::Stopped,
        }
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MediaTrack {}

struct StreamInner {
    id: String,
    tracks: Vec<MediaTrack>,
}

/// Handle to a camera stream
///
/// A cheap, clonable reference in the same sense as a browser `MediaStream`:
/// every clone refers to the same tracks. Two handles compare equal when they
/// refer to the same stream.
#[derive(Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    /// Create a stream from its tracks with a generated ID
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        let id = format!("stream-{}", NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, tracks)
    }

    /// Create a stream with an explicit ID
    pub fn with_id(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: id.into(),
                tracks,
            }),
        }
    }

    /// Stream ID
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// All tracks in the stream
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    /// Check if at least one track is live
    pub fn is_active(&self) -> bool {
        self.inner.tracks.iter().any(MediaTrack::is_live)
    }

    /// Check if no track is live any more
    pub fn is_stopped(&self) -> bool {
        !self.is_active()
    }

    /// Stop every track
    pub fn stop_all(&self) {
        for track in &self.inner.tracks {
            track.stop();
        }
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.inner.id)
            .field("tracks", &self.inner.tracks)
            .finish()
    }
}

/// Identity comparison: two handles are equal only when they share the same
/// underlying stream, regardless of id.
impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MediaStream {}
