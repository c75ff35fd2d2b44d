//! Capture-side media model.
//!
//! A [`MediaStream`] bundles the video tracks produced by a capture
//! provider. Each [`VideoTrack`] fires an "ended" event exactly once, either
//! because its source went away (the user revoked permission, the window
//! closed) or because [`VideoTrack::stop`] tore the hardware down.
//!
//! Hosts that own real capture hardware install a stop hook with
//! [`VideoTrack::on_stop`] and call [`VideoTrack::end`] once the device has
//! actually released. Without a hook, stopping ends the track immediately.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Result;
use crate::identifiers::{StreamId, TrackId};

// ============================================================================
// Constants
// ============================================================================

/// Largest capture width or height requested from a provider.
pub const MAX_CAPTURE_DIMENSION: u32 = 4096;

// ============================================================================
// Types
// ============================================================================

/// Callback fired once when a track ends.
type EndedListener = Box<dyn FnOnce() + Send>;

/// Hardware teardown requested by [`VideoTrack::stop`].
type StopHook = Box<dyn FnOnce(VideoTrack) + Send>;

/// Mutable track state.
#[derive(Default)]
struct TrackState {
    ended: bool,
    stop_requested: bool,
    listeners: Vec<EndedListener>,
    stop_hook: Option<StopHook>,
}

struct TrackInner {
    id: TrackId,
    label: String,
    state: Mutex<TrackState>,
}

// ============================================================================
// VideoTrack
// ============================================================================

/// A live video track.
///
/// Cheap to clone; clones observe the same "ended" event.
#[derive(Clone)]
pub struct VideoTrack {
    inner: Arc<TrackInner>,
}

impl fmt::Debug for VideoTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoTrack")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("ended", &self.is_ended())
            .finish_non_exhaustive()
    }
}

impl PartialEq for VideoTrack {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for VideoTrack {}

impl VideoTrack {
    /// Creates a live track with a generated id.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_id(TrackId::generate(), label)
    }

    /// Creates a live track with a known id.
    #[must_use]
    pub fn with_id(id: TrackId, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id,
                label: label.into(),
                state: Mutex::new(TrackState::default()),
            }),
        }
    }

    /// Returns the track id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &TrackId {
        &self.inner.id
    }

    /// Returns the human readable label.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Returns `true` once "ended" has fired.
    #[inline]
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.state.lock().ended
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    #[inline]
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.inner.state.lock().stop_requested
    }

    /// Installs the hardware teardown run by [`stop`](Self::stop).
    ///
    /// The hook must eventually call [`end`](Self::end) on the track it
    /// receives.
    pub fn on_stop(&self, hook: impl FnOnce(VideoTrack) + Send + 'static) {
        self.inner.state.lock().stop_hook = Some(Box::new(hook));
    }

    /// Registers a callback for the "ended" event.
    ///
    /// Runs immediately if the track has already ended. Listeners run in
    /// registration order.
    pub fn add_ended_listener(&self, listener: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.state.lock();
        if state.ended {
            drop(state);
            listener();
            return;
        }
        state.listeners.push(Box::new(listener));
    }

    /// Returns a future that resolves once the track has ended.
    pub fn ended(&self) -> TrackEnded {
        let (tx, rx) = oneshot::channel();
        self.add_ended_listener(move || {
            let _ = tx.send(());
        });
        TrackEnded { rx }
    }

    /// Requests hardware teardown.
    ///
    /// Runs the stop hook if one is installed, otherwise ends the track
    /// immediately. Has no effect on a track that already ended.
    pub fn stop(&self) {
        let hook = {
            let mut state = self.inner.state.lock();
            if state.ended || state.stop_requested {
                return;
            }
            state.stop_requested = true;
            state.stop_hook.take()
        };

        debug!(track_id = %self.inner.id, "Stopping video track");
        match hook {
            Some(hook) => hook(self.clone()),
            None => self.end(),
        }
    }

    /// Fires the "ended" event. Later calls do nothing.
    pub fn end(&self) {
        let listeners = {
            let mut state = self.inner.state.lock();
            if state.ended {
                return;
            }
            state.ended = true;
            state.stop_hook = None;
            std::mem::take(&mut state.listeners)
        };

        debug!(track_id = %self.inner.id, listeners = listeners.len(), "Video track ended");
        for listener in listeners {
            listener();
        }
    }
}

// ============================================================================
// TrackEnded
// ============================================================================

/// Future resolving when a track fires "ended".
///
/// Also resolves if every handle to the track is dropped, since the track
/// can no longer produce frames.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct TrackEnded {
    rx: oneshot::Receiver<()>,
}

impl Future for TrackEnded {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

// ============================================================================
// MediaStream
// ============================================================================

/// A captured stream and its video tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    id: StreamId,
    video_tracks: Vec<VideoTrack>,
}

impl MediaStream {
    /// Creates a stream with a generated id.
    #[must_use]
    pub fn new(video_tracks: Vec<VideoTrack>) -> Self {
        Self::with_id(StreamId::generate(), video_tracks)
    }

    /// Creates a stream with a known id.
    #[must_use]
    pub fn with_id(id: StreamId, video_tracks: Vec<VideoTrack>) -> Self {
        Self { id, video_tracks }
    }

    /// Returns the stream id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Returns every video track, ended or not.
    #[inline]
    #[must_use]
    pub fn video_tracks(&self) -> &[VideoTrack] {
        &self.video_tracks
    }

    /// Returns the first video track that has not ended.
    #[must_use]
    pub fn video_track(&self) -> Option<&VideoTrack> {
        self.video_tracks.iter().find(|track| !track.is_ended())
    }

    /// Returns `true` while any track is live.
    #[must_use]
    pub fn active(&self) -> bool {
        self.video_track().is_some()
    }

    /// Stops every track.
    pub fn stop(&self) {
        for track in &self.video_tracks {
            track.stop();
        }
    }
}

// ============================================================================
// Capture
// ============================================================================

/// What to capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CaptureSource {
    /// A screen or window picked by the user.
    Desktop {
        /// Source id returned by the desktop picker.
        source_id: String,
    },
    /// The default camera.
    Camera,
}

/// Constraints passed to a [`CaptureProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    /// Source to capture.
    pub source: CaptureSource,
    /// Maximum frame width.
    pub max_width: u32,
    /// Maximum frame height.
    pub max_height: u32,
}

impl CaptureConstraints {
    /// Constraints for a desktop source.
    #[must_use]
    pub fn desktop(source_id: impl Into<String>) -> Self {
        Self::for_source(CaptureSource::Desktop {
            source_id: source_id.into(),
        })
    }

    /// Constraints for the default camera.
    #[must_use]
    pub fn camera() -> Self {
        Self::for_source(CaptureSource::Camera)
    }

    fn for_source(source: CaptureSource) -> Self {
        Self {
            source,
            max_width: MAX_CAPTURE_DIMENSION,
            max_height: MAX_CAPTURE_DIMENSION,
        }
    }
}

/// Produces live streams.
///
/// Implementations report failures as [`Error::Capture`](crate::Error::Capture)
/// carrying the platform's error name.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Captures a stream matching `constraints`.
    async fn capture(&self, constraints: &CaptureConstraints) -> Result<MediaStream>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_stop_without_hook_ends_immediately() {
        let track = VideoTrack::new("screen");
        let mut ended = task::spawn(track.ended());
        assert_pending!(ended.poll());

        track.stop();

        assert!(track.is_ended());
        assert!(track.is_stop_requested());
        assert_ready!(ended.poll());
    }

    #[test]
    fn test_stop_hook_defers_end() {
        let track = VideoTrack::new("camera");
        let parked = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&parked);
        track.on_stop(move |track| *slot.lock() = Some(track));

        let mut ended = task::spawn(track.ended());
        track.stop();

        assert!(!track.is_ended());
        assert_pending!(ended.poll());

        let released = parked.lock().take().expect("hook ran");
        released.end();
        assert!(ended.is_woken());
        assert_ready!(ended.poll());
    }

    #[test]
    fn test_listeners_fire_once_in_order() {
        let track = VideoTrack::new("screen");
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            track.add_ended_listener(move || order.lock().push(n));
        }

        track.end();
        track.end();
        track.stop();

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_listener_after_end_runs_immediately() {
        let track = VideoTrack::new("screen");
        track.end();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        track.add_ended_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let mut ended = task::spawn(track.ended());
        assert_ready!(ended.poll());
    }

    #[test]
    fn test_stream_picks_first_live_track() {
        let first = VideoTrack::new("a");
        let second = VideoTrack::new("b");
        let stream = MediaStream::new(vec![first.clone(), second.clone()]);

        assert!(stream.active());
        assert_eq!(stream.video_track(), Some(&first));

        first.end();
        assert_eq!(stream.video_track(), Some(&second));

        stream.stop();
        assert!(!stream.active());
        assert!(stream.video_track().is_none());
    }

    #[test]
    fn test_empty_stream_is_inactive() {
        let stream = MediaStream::new(Vec::new());
        assert!(!stream.active());
        assert!(stream.video_tracks().is_empty());
    }

    #[test]
    fn test_constraints_cap_dimensions() {
        let desktop = CaptureConstraints::desktop("screen:0");
        assert_eq!(desktop.max_width, MAX_CAPTURE_DIMENSION);
        assert_eq!(desktop.max_height, MAX_CAPTURE_DIMENSION);
        assert_eq!(
            serde_json::to_value(&desktop.source).expect("serialize"),
            serde_json::json!({"kind": "desktop", "source_id": "screen:0"})
        );
        assert_eq!(CaptureConstraints::camera().source, CaptureSource::Camera);
    }
}
