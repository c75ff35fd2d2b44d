//! Sharer handle and lifecycle operations.
//!
//! All checks and state transitions happen when an operation is called; the
//! returned future only waits for the engine. A second `stop()` issued while
//! the first is in flight therefore already sees the sharer idle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::{EncodingOptions, Engine};
use crate::error::{Error, Result};
use crate::identifiers::SharerId;
use crate::media::{CaptureConstraints, CaptureProvider, MediaStream, VideoTrack};
use crate::protocol::Command;

use super::lifecycle::{Lifecycle, OnStopped, SharerState, StopCompletion};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a sharer.
pub(crate) struct SharerInner {
    /// Engine-assigned id, immutable.
    id: SharerId,
    /// Engine that created this sharer.
    engine: Engine,
    /// State machine and stop waiters.
    lifecycle: Mutex<Lifecycle>,
}

// ============================================================================
// Sharer
// ============================================================================

/// One outbound media share on the engine.
///
/// Created by [`Engine::create_sharer`]. A sharer is reusable across any
/// number of share/stop cycles and never disposes itself; it is released
/// when the last clone is dropped.
///
/// # Example
///
/// ```ignore
/// let sharer = engine.create_sharer(options).await?;
/// sharer.attach_stream(stream).await?;
///
/// // later
/// let finished = sharer.stop().await?;
/// finished.await;
/// ```
#[derive(Clone)]
pub struct Sharer {
    inner: Arc<SharerInner>,
}

impl fmt::Debug for Sharer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sharer")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Sharer - Accessors
// ============================================================================

impl Sharer {
    pub(crate) fn new(id: SharerId, engine: Engine) -> Self {
        Self {
            inner: Arc::new(SharerInner {
                id,
                engine,
                lifecycle: Mutex::new(Lifecycle::new()),
            }),
        }
    }

    /// Returns the engine-assigned id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SharerId {
        &self.inner.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SharerState {
        self.inner.lifecycle.lock().state()
    }

    /// Returns `true` while a stream is attached.
    #[inline]
    #[must_use]
    pub fn is_sharing(&self) -> bool {
        self.state() == SharerState::Sharing
    }

    /// Returns the attached stream.
    #[must_use]
    pub fn stream(&self) -> Option<MediaStream> {
        self.inner.lifecycle.lock().stream().cloned()
    }

    /// Returns the attached video track.
    #[must_use]
    pub fn video_track(&self) -> Option<VideoTrack> {
        self.inner.lifecycle.lock().video_track().cloned()
    }
}

// ============================================================================
// Sharer - Lifecycle
// ============================================================================

impl Sharer {
    /// Attaches `stream` and hands its video track to the engine.
    ///
    /// Unless a check fails, the sharer is `Sharing` as soon as this returns;
    /// the future resolves once the engine acknowledges. If the track ends
    /// while sharing, the sharer stops itself.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if already sharing (nothing is sent)
    /// - [`Error::InvalidInput`] if the stream has no live video track
    ///   (nothing is sent)
    /// - [`Error::RemoteFailure`] if the engine refuses; the sharer returns
    ///   to `Idle`
    pub fn attach_stream(
        &self,
        stream: MediaStream,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let sharer = self.clone();
        let prepared = self.prepare_attach(stream);

        async move {
            let (generation, reply) = prepared?;
            match reply.await {
                Ok(_) => {
                    info!(sharer_id = %sharer.inner.id, "Stream attached");
                    Ok(())
                }
                Err(e) => {
                    warn!(sharer_id = %sharer.inner.id, error = %e, "Engine refused stream");
                    sharer.abandon(generation);
                    Err(e)
                }
            }
        }
    }

    /// Stops sharing.
    ///
    /// The sharer is `Idle` as soon as this returns. The future resolves when
    /// the engine acknowledges, after which the local track is stopped; the
    /// returned [`StopCompletion`] resolves when the track reports "ended".
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if not sharing (nothing is sent)
    /// - [`Error::RemoteFailure`] if the engine refuses; the sharer stays
    ///   `Idle` and the track keeps running
    pub fn stop(&self) -> impl Future<Output = Result<StopCompletion>> + Send + 'static {
        let sharer_id = self.inner.id.clone();
        let prepared = self.prepare_stop();

        async move {
            let (video_track, reply) = prepared?;
            reply.await?;

            let finished = video_track.ended();
            video_track.stop();
            info!(%sharer_id, "Sharer stopped");
            Ok(StopCompletion::new(finished))
        }
    }

    /// Changes the encoder bitrate and frame rate.
    ///
    /// Local state is untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `encoding` fails validation
    /// - [`Error::RemoteFailure`] if the engine refuses
    pub fn change_encoding(
        &self,
        encoding: EncodingOptions,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let reply = encoding.validate().and_then(|()| {
            self.inner.engine.request(Command::ChangeEncoding {
                sharer_id: self.inner.id.clone(),
                encoding,
            })
        });

        async move {
            reply?.await?;
            debug!(bitrate = encoding.bitrate, fps = encoding.fps, "Encoding changed");
            Ok(())
        }
    }

    /// Returns a future resolving once the current sharing cycle has fully
    /// stopped.
    ///
    /// Resolves immediately when idle. Every waiter is notified exactly once.
    pub fn on_stopped(&self) -> OnStopped {
        OnStopped::new(self.inner.lifecycle.lock().wait())
    }

    /// Captures a stream from `provider` and attaches it.
    ///
    /// Returns the captured stream. If attaching fails the stream is stopped
    /// so the capture hardware is released.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if already sharing (nothing is captured)
    /// - [`Error::Capture`] if the provider fails
    /// - any error from [`attach_stream`](Self::attach_stream)
    pub async fn capture_and_attach(
        &self,
        provider: &dyn CaptureProvider,
        constraints: &CaptureConstraints,
    ) -> Result<MediaStream> {
        if self.is_sharing() {
            return Err(Error::invalid_state("Already sharing a stream"));
        }

        let stream = provider.capture(constraints).await?;
        debug!(stream_id = %stream.id(), "Stream captured");

        if let Err(e) = self.attach_stream(stream.clone()).await {
            stream.stop();
            return Err(e);
        }
        Ok(stream)
    }
}

// ============================================================================
// Sharer - Internal
// ============================================================================

impl Sharer {
    fn prepare_attach(
        &self,
        stream: MediaStream,
    ) -> Result<(u64, impl Future<Output = Result<Value>> + Send + 'static)> {
        let (generation, video_track) = self.inner.lifecycle.lock().begin(stream)?;

        let reply = self.inner.engine.request(Command::SetSharerTracks {
            sharer_id: self.inner.id.clone(),
            video_track: video_track.id().clone(),
        });
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.abandon(generation);
                return Err(e);
            }
        };

        // May run immediately if the track ended in the meantime.
        let weak = Arc::downgrade(&self.inner);
        video_track.add_ended_listener(move || {
            if let Some(inner) = weak.upgrade() {
                Sharer { inner }.track_ended(generation);
            }
        });

        debug!(sharer_id = %self.inner.id, generation, "Sharing started");
        Ok((generation, reply))
    }

    fn prepare_stop(
        &self,
    ) -> Result<(VideoTrack, impl Future<Output = Result<Value>> + Send + 'static)> {
        let ended = self.inner.lifecycle.lock().end_sharing();
        let Some((generation, video_track)) = ended else {
            return Err(Error::invalid_state("Not sharing a stream"));
        };

        debug!(sharer_id = %self.inner.id, generation, "Stopping sharer");
        let reply = self.inner.engine.request(Command::StopSharer {
            sharer_id: self.inner.id.clone(),
        })?;
        Ok((video_track, reply))
    }

    /// Handles the "ended" event of the track attached in `generation`.
    ///
    /// If that cycle is still live this is an implicit stop: the engine is
    /// told without waiting for a reply. Either way the cycle's waiters fire.
    fn track_ended(&self, generation: u64) {
        let (stopped, waiters) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            let stopped = lifecycle.end_generation(generation).is_some();
            (stopped, lifecycle.take_waiters(generation))
        };

        if stopped {
            info!(sharer_id = %self.inner.id, "Track ended, stopping sharer");
            self.inner.engine.notify(Command::StopSharer {
                sharer_id: self.inner.id.clone(),
            });
        }

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Rolls back a cycle the engine never accepted.
    fn abandon(&self, generation: u64) {
        let waiters = {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.end_generation(generation);
            lifecycle.take_waiters(generation)
        };

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    use crate::engine::SharerOptions;
    use crate::transport::{ChannelPeer, ChannelTransport};

    /// Builds an engine and a sharer `S1`; the next command id is 1.
    fn sharer() -> (Engine, ChannelPeer, Sharer) {
        let (transport, mut peer) = ChannelTransport::pair();
        let engine = Engine::builder()
            .transport(transport)
            .build()
            .expect("valid config");

        let options = SharerOptions::new("127.0.0.1", 1000, 30, 5004);
        let mut created = task::spawn(engine.create_sharer(options));
        peer.try_next_request().expect("startSharer");
        peer.reply(0, true, json!({"sharer_id": "S1"}));
        let sharer = assert_ready!(created.poll()).expect("created");

        (engine, peer, sharer)
    }

    /// A track whose hardware release is driven by the test.
    fn deferred_track() -> (VideoTrack, Arc<Mutex<Option<VideoTrack>>>) {
        let track = VideoTrack::new("screen");
        let parked = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&parked);
        track.on_stop(move |track| *slot.lock() = Some(track));
        (track, parked)
    }

    fn attach_acked(peer: &mut ChannelPeer, sharer: &Sharer, track: &VideoTrack, cmd_id: u64) {
        let stream = MediaStream::new(vec![track.clone()]);
        let mut attached = task::spawn(sharer.attach_stream(stream));
        peer.try_next_request().expect("setSharerTracks");
        peer.reply(cmd_id, true, json!({}));
        assert_ready!(attached.poll()).expect("attached");
    }

    #[test]
    fn test_attach_stream_round_trip() {
        let (_engine, mut peer, sharer) = sharer();
        let track = VideoTrack::new("screen");
        let mut attached =
            task::spawn(sharer.attach_stream(MediaStream::new(vec![track.clone()])));

        let request = peer.try_next_request().expect("setSharerTracks");
        assert_eq!(
            request,
            json!({
                "cmd": "setSharerTracks",
                "cmd_id": 1,
                "payload": {"sharer_id": "S1", "video_track": track.id().as_str()},
            })
        );
        assert_pending!(attached.poll());

        peer.reply(1, true, json!({}));

        assert_ready!(attached.poll()).expect("attached");
        assert_eq!(sharer.state(), SharerState::Sharing);
        assert_eq!(sharer.video_track(), Some(track));
    }

    #[test]
    fn test_attach_while_sharing_sends_nothing() {
        let (_engine, mut peer, sharer) = sharer();
        let track = VideoTrack::new("screen");
        attach_acked(&mut peer, &sharer, &track, 1);

        let other = MediaStream::new(vec![VideoTrack::new("other")]);
        let mut again = task::spawn(sharer.attach_stream(other));

        assert!(matches!(
            assert_ready!(again.poll()),
            Err(Error::InvalidState { .. })
        ));
        assert!(peer.try_next_request().is_none());
        assert_eq!(sharer.video_track(), Some(track));
    }

    #[test]
    fn test_attach_unusable_stream_sends_nothing() {
        let (engine, mut peer, sharer) = sharer();

        let mut empty = task::spawn(sharer.attach_stream(MediaStream::new(Vec::new())));
        assert!(matches!(
            assert_ready!(empty.poll()),
            Err(Error::InvalidInput { .. })
        ));

        let ended = VideoTrack::new("gone");
        ended.end();
        let mut inactive = task::spawn(sharer.attach_stream(MediaStream::new(vec![ended])));
        assert!(matches!(
            assert_ready!(inactive.poll()),
            Err(Error::InvalidInput { .. })
        ));

        assert!(peer.try_next_request().is_none());
        assert_eq!(engine.pending_commands(), 0);
        assert_eq!(sharer.state(), SharerState::Idle);
    }

    #[test]
    fn test_stop_while_idle_sends_nothing() {
        let (_engine, mut peer, sharer) = sharer();

        let mut stopped = task::spawn(sharer.stop());

        assert!(matches!(
            assert_ready!(stopped.poll()),
            Err(Error::InvalidState { .. })
        ));
        assert!(peer.try_next_request().is_none());
    }

    #[test]
    fn test_stop_is_two_phase() {
        let (_engine, mut peer, sharer) = sharer();
        let (track, parked) = deferred_track();
        attach_acked(&mut peer, &sharer, &track, 1);

        let mut first_waiter = task::spawn(sharer.on_stopped());
        let mut second_waiter = task::spawn(sharer.on_stopped());

        let mut stopped = task::spawn(sharer.stop());
        assert_eq!(sharer.state(), SharerState::Idle);
        assert!(sharer.stream().is_none());
        assert_eq!(
            peer.try_next_request().expect("stopSharer"),
            json!({"cmd": "stopSharer", "cmd_id": 2, "payload": {"sharer_id": "S1"}})
        );
        assert_pending!(stopped.poll());

        peer.reply(2, true, json!({}));

        let completion = assert_ready!(stopped.poll()).expect("engine stopped");
        assert!(track.is_stop_requested());
        let mut completion = task::spawn(completion);
        assert_pending!(completion.poll());
        assert_pending!(first_waiter.poll());

        parked.lock().take().expect("hook ran").end();

        assert_ready!(completion.poll());
        assert_ready!(first_waiter.poll());
        assert_ready!(second_waiter.poll());

        let mut late = task::spawn(sharer.on_stopped());
        assert_ready!(late.poll());
        assert!(peer.try_next_request().is_none());
    }

    #[test]
    fn test_second_stop_sees_idle() {
        let (_engine, mut peer, sharer) = sharer();
        attach_acked(&mut peer, &sharer, &VideoTrack::new("screen"), 1);

        let _first = sharer.stop();
        let mut second = task::spawn(sharer.stop());

        assert!(matches!(
            assert_ready!(second.poll()),
            Err(Error::InvalidState { .. })
        ));
        assert_eq!(peer.try_next_request().expect("one stop")["cmd_id"], 2);
        assert!(peer.try_next_request().is_none());
    }

    #[test]
    fn test_track_end_is_implicit_stop() {
        let (engine, mut peer, sharer) = sharer();
        let track = VideoTrack::new("screen");
        attach_acked(&mut peer, &sharer, &track, 1);
        let mut waiter = task::spawn(sharer.on_stopped());

        track.end();

        assert_eq!(sharer.state(), SharerState::Idle);
        assert_ready!(waiter.poll());
        assert_eq!(
            peer.try_next_request().expect("implicit stop"),
            json!({"cmd": "stopSharer", "cmd_id": 2, "payload": {"sharer_id": "S1"}})
        );

        peer.reply(2, true, json!({}));
        assert_eq!(engine.pending_commands(), 0);

        let mut stopped = task::spawn(sharer.stop());
        assert!(matches!(
            assert_ready!(stopped.poll()),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_track_end_during_stop_is_noop() {
        let (engine, mut peer, sharer) = sharer();
        let track = VideoTrack::new("screen");
        attach_acked(&mut peer, &sharer, &track, 1);
        let mut waiter = task::spawn(sharer.on_stopped());

        let mut stopped = task::spawn(sharer.stop());
        assert_eq!(peer.try_next_request().expect("stopSharer")["cmd_id"], 2);
        assert_pending!(stopped.poll());

        track.end();

        // The explicit stop already tore down; the end only flushes waiters.
        assert!(peer.try_next_request().is_none());
        assert_ready!(waiter.poll());
        assert_eq!(sharer.inner.lifecycle.lock().waiter_count(), 0);
        assert_eq!(engine.pending_commands(), 1);

        peer.reply(2, true, json!({}));

        let completion = assert_ready!(stopped.poll()).expect("engine stopped");
        let mut completion = task::spawn(completion);
        assert_ready!(completion.poll());
        assert_eq!(sharer.state(), SharerState::Idle);
        assert_eq!(engine.pending_commands(), 0);
        assert!(peer.try_next_request().is_none());
    }

    #[test]
    fn test_attach_rejected_returns_to_idle() {
        let (_engine, mut peer, sharer) = sharer();
        let track = VideoTrack::new("screen");
        let mut attached =
            task::spawn(sharer.attach_stream(MediaStream::new(vec![track.clone()])));
        let mut waiter = task::spawn(sharer.on_stopped());
        peer.try_next_request().expect("setSharerTracks");

        peer.reply(1, false, json!("no encoder"));

        assert!(assert_ready!(attached.poll()).unwrap_err().is_remote_failure());
        assert_eq!(sharer.state(), SharerState::Idle);
        assert_ready!(waiter.poll());

        // The rejected track ending later is not a stop.
        track.end();
        assert!(peer.try_next_request().is_none());

        attach_acked(&mut peer, &sharer, &VideoTrack::new("retry"), 2);
        assert!(sharer.is_sharing());
    }

    #[test]
    fn test_stop_rejected_keeps_track_running() {
        let (_engine, mut peer, sharer) = sharer();
        let track = VideoTrack::new("screen");
        attach_acked(&mut peer, &sharer, &track, 1);

        let mut stopped = task::spawn(sharer.stop());
        peer.try_next_request().expect("stopSharer");
        peer.reply(2, false, json!("busy"));

        assert!(assert_ready!(stopped.poll()).unwrap_err().is_remote_failure());
        assert_eq!(sharer.state(), SharerState::Idle);
        assert!(!track.is_stop_requested());
    }

    #[test]
    fn test_stale_track_end_leaves_new_cycle_alone() {
        let (_engine, mut peer, sharer) = sharer();
        let old = VideoTrack::new("old");
        attach_acked(&mut peer, &sharer, &old, 1);

        let mut stopped = task::spawn(sharer.stop());
        peer.try_next_request().expect("stopSharer");
        peer.reply(2, false, json!("busy"));
        assert!(assert_ready!(stopped.poll()).is_err());

        let new = VideoTrack::new("new");
        attach_acked(&mut peer, &sharer, &new, 3);
        let mut waiter = task::spawn(sharer.on_stopped());

        old.end();

        assert!(sharer.is_sharing());
        assert_eq!(sharer.video_track(), Some(new));
        assert_pending!(waiter.poll());
        assert!(peer.try_next_request().is_none());
    }

    #[test]
    fn test_reuse_across_cycles() {
        let (_engine, mut peer, sharer) = sharer();

        for (cycle, cmd_id) in [(0_u64, 1_u64), (1, 3)] {
            let track = VideoTrack::new(format!("cycle-{cycle}"));
            attach_acked(&mut peer, &sharer, &track, cmd_id);

            let mut stopped = task::spawn(sharer.stop());
            peer.try_next_request().expect("stopSharer");
            peer.reply(cmd_id + 1, true, json!({}));
            let completion = assert_ready!(stopped.poll()).expect("stopped");

            let mut completion = task::spawn(completion);
            assert_ready!(completion.poll());
            assert!(track.is_ended());
        }
        assert_eq!(sharer.state(), SharerState::Idle);
    }

    #[test]
    fn test_change_encoding_is_pass_through() {
        let (_engine, mut peer, sharer) = sharer();

        let mut changed = task::spawn(sharer.change_encoding(EncodingOptions::new(2500, 60)));
        assert_eq!(
            peer.try_next_request().expect("changeEncoding"),
            json!({
                "cmd": "changeEncoding",
                "cmd_id": 1,
                "payload": {"sharer_id": "S1", "bitrate": "2500", "fps": "60"},
            })
        );
        peer.reply(1, true, json!({}));
        assert_ready!(changed.poll()).expect("changed");
        assert_eq!(sharer.state(), SharerState::Idle);

        let mut invalid = task::spawn(sharer.change_encoding(EncodingOptions::new(0, 30)));
        assert!(matches!(
            assert_ready!(invalid.poll()),
            Err(Error::InvalidInput { .. })
        ));
        assert!(peer.try_next_request().is_none());
    }

    struct FixedProvider {
        track: Option<VideoTrack>,
    }

    #[async_trait]
    impl CaptureProvider for FixedProvider {
        async fn capture(&self, _constraints: &CaptureConstraints) -> Result<MediaStream> {
            match &self.track {
                Some(track) => Ok(MediaStream::new(vec![track.clone()])),
                None => Err(Error::capture("NotAllowedError", "permission denied")),
            }
        }
    }

    #[tokio::test]
    async fn test_capture_and_attach() {
        let (_engine, mut peer, sharer) = sharer();
        let track = VideoTrack::new("desktop");
        let provider = FixedProvider {
            track: Some(track.clone()),
        };

        let engine_side = tokio::spawn(async move {
            let request = peer.next_request().await.expect("setSharerTracks");
            peer.reply(request["cmd_id"].as_u64().expect("id"), true, json!({}));
            peer
        });

        let stream = sharer
            .capture_and_attach(&provider, &CaptureConstraints::desktop("screen:0"))
            .await
            .expect("attached");

        assert_eq!(stream.video_track(), Some(&track));
        assert!(sharer.is_sharing());
        let _peer = engine_side.await.expect("engine task");
    }

    #[tokio::test]
    async fn test_capture_failure_surfaces() {
        let (_engine, mut peer, sharer) = sharer();
        let provider = FixedProvider { track: None };

        let err = sharer
            .capture_and_attach(&provider, &CaptureConstraints::camera())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Capture { .. }));
        assert_eq!(sharer.state(), SharerState::Idle);
        assert!(peer.try_next_request().is_none());
    }
}
