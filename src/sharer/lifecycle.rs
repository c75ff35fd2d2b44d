//! Sharer state machine.
//!
//! ```text
//!          begin(stream)
//!   Idle ─────────────────► Sharing { stream, video_track }
//!    ▲                          │
//!    └──────────────────────────┘
//!      end_sharing() / end_generation(g)
//! ```
//!
//! Every `Idle → Sharing` transition opens a new *generation*. Stop waiters
//! and track listeners are tagged with the generation they belong to, so a
//! track from an earlier cycle ending late can never tear down or flush a
//! later cycle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::media::{MediaStream, TrackEnded, VideoTrack};

// ============================================================================
// SharerState
// ============================================================================

/// Observable state of a sharer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharerState {
    /// No stream attached.
    Idle,
    /// A stream is attached and handed to the engine.
    Sharing,
}

impl fmt::Display for SharerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Sharing => f.write_str("sharing"),
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Sharing phase with its owned media.
enum Phase {
    Idle,
    Sharing {
        stream: MediaStream,
        video_track: VideoTrack,
    },
}

/// Mutable sharer state, guarded by the sharer's mutex.
pub(crate) struct Lifecycle {
    phase: Phase,
    /// Generation of the current or most recent sharing cycle.
    generation: u64,
    /// Stop waiters in enqueue order, tagged with their generation.
    stop_waiters: Vec<(u64, oneshot::Sender<()>)>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            generation: 0,
            stop_waiters: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> SharerState {
        match self.phase {
            Phase::Idle => SharerState::Idle,
            Phase::Sharing { .. } => SharerState::Sharing,
        }
    }

    pub(crate) fn stream(&self) -> Option<&MediaStream> {
        match &self.phase {
            Phase::Sharing { stream, .. } => Some(stream),
            Phase::Idle => None,
        }
    }

    pub(crate) fn video_track(&self) -> Option<&VideoTrack> {
        match &self.phase {
            Phase::Sharing { video_track, .. } => Some(video_track),
            Phase::Idle => None,
        }
    }

    /// Starts a sharing cycle with `stream`.
    ///
    /// Returns the new generation and the track to hand to the engine. On
    /// error nothing changes.
    pub(crate) fn begin(&mut self, stream: MediaStream) -> Result<(u64, VideoTrack)> {
        if matches!(self.phase, Phase::Sharing { .. }) {
            return Err(Error::invalid_state("Already sharing a stream"));
        }
        if stream.video_tracks().is_empty() {
            return Err(Error::invalid_input("Stream has no video tracks"));
        }
        let Some(video_track) = stream.video_track().cloned() else {
            return Err(Error::invalid_input("Need an active stream to share"));
        };

        self.generation += 1;
        self.phase = Phase::Sharing {
            stream,
            video_track: video_track.clone(),
        };
        Ok((self.generation, video_track))
    }

    /// Leaves the current sharing cycle.
    ///
    /// This is the only `Sharing → Idle` transition. Returns `None` if
    /// already idle, so of two racing stops only the first gets the track.
    pub(crate) fn end_sharing(&mut self) -> Option<(u64, VideoTrack)> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Sharing { video_track, .. } => Some((self.generation, video_track)),
            Phase::Idle => None,
        }
    }

    /// Leaves the sharing cycle only if it is still `generation`.
    pub(crate) fn end_generation(&mut self, generation: u64) -> Option<VideoTrack> {
        if self.generation != generation || matches!(self.phase, Phase::Idle) {
            return None;
        }
        self.end_sharing().map(|(_, track)| track)
    }

    /// Registers a stop waiter for the current cycle.
    ///
    /// Returns `None` when idle: there is nothing to wait for.
    pub(crate) fn wait(&mut self) -> Option<oneshot::Receiver<()>> {
        if matches!(self.phase, Phase::Idle) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.stop_waiters.push((self.generation, tx));
        Some(rx)
    }

    /// Removes and returns the waiters of `generation`, in enqueue order.
    pub(crate) fn take_waiters(&mut self, generation: u64) -> Vec<oneshot::Sender<()>> {
        let (flushed, kept) = std::mem::take(&mut self.stop_waiters)
            .into_iter()
            .partition::<Vec<_>, _>(|(tagged, _)| *tagged == generation);
        self.stop_waiters = kept;
        flushed.into_iter().map(|(_, tx)| tx).collect()
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.stop_waiters.len()
    }
}

// ============================================================================
// OnStopped
// ============================================================================

/// Future resolving once the sharer has fully stopped.
///
/// Ready immediately if the sharer was idle when it was created.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct OnStopped {
    rx: Option<oneshot::Receiver<()>>,
}

impl OnStopped {
    pub(crate) fn new(rx: Option<oneshot::Receiver<()>>) -> Self {
        Self { rx }
    }
}

impl Future for OnStopped {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.rx.as_mut() {
            // A dropped sender means the sharer is gone, which is stopped too.
            Some(rx) => Pin::new(rx).poll(cx).map(|_| ()),
            None => Poll::Ready(()),
        }
    }
}

// ============================================================================
// StopCompletion
// ============================================================================

/// Second phase of [`Sharer::stop`](super::Sharer::stop).
///
/// Resolves when the local track reports "ended", after the engine has
/// already torn its side down.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct StopCompletion {
    ended: TrackEnded,
}

impl StopCompletion {
    pub(crate) fn new(ended: TrackEnded) -> Self {
        Self { ended }
    }
}

impl Future for StopCompletion {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.ended).poll(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn live_stream() -> MediaStream {
        MediaStream::new(vec![VideoTrack::new("screen")])
    }

    #[test]
    fn test_begin_opens_generation() {
        let mut lifecycle = Lifecycle::new();
        let (generation, track) = lifecycle.begin(live_stream()).expect("idle");

        assert_eq!(generation, 1);
        assert_eq!(lifecycle.state(), SharerState::Sharing);
        assert_eq!(lifecycle.video_track(), Some(&track));
        assert!(lifecycle.stream().is_some());
    }

    #[test]
    fn test_begin_rejects_without_mutation() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.begin(live_stream()).expect("idle");

        let err = lifecycle.begin(live_stream()).unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(lifecycle.state(), SharerState::Sharing);

        let mut idle = Lifecycle::new();
        let ended = VideoTrack::new("gone");
        ended.end();
        assert!(matches!(
            idle.begin(MediaStream::new(vec![ended])),
            Err(Error::InvalidInput { .. })
        ));
        assert!(matches!(
            idle.begin(MediaStream::new(Vec::new())),
            Err(Error::InvalidInput { .. })
        ));
        assert_eq!(idle.state(), SharerState::Idle);
    }

    #[test]
    fn test_only_first_stop_wins() {
        let mut lifecycle = Lifecycle::new();
        let (generation, _) = lifecycle.begin(live_stream()).expect("idle");

        assert!(lifecycle.end_sharing().is_some());
        assert!(lifecycle.end_sharing().is_none());
        assert!(lifecycle.end_generation(generation).is_none());
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut lifecycle = Lifecycle::new();
        let (first, _) = lifecycle.begin(live_stream()).expect("idle");
        lifecycle.end_sharing();
        let (second, _) = lifecycle.begin(live_stream()).expect("idle");

        assert!(lifecycle.end_generation(first).is_none());
        assert_eq!(lifecycle.state(), SharerState::Sharing);
        assert!(lifecycle.end_generation(second).is_some());
    }

    #[test]
    fn test_waiters_flush_per_generation() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.wait().is_none());

        let (first, _) = lifecycle.begin(live_stream()).expect("idle");
        let _a = lifecycle.wait().expect("sharing");
        let _b = lifecycle.wait().expect("sharing");
        lifecycle.end_sharing();
        let (second, _) = lifecycle.begin(live_stream()).expect("idle");
        let _c = lifecycle.wait().expect("sharing");

        assert_eq!(lifecycle.take_waiters(first).len(), 2);
        assert_eq!(lifecycle.waiter_count(), 1);
        assert_eq!(lifecycle.take_waiters(second).len(), 1);
        assert_eq!(lifecycle.waiter_count(), 0);
    }

    #[test]
    fn test_waiters_flush_in_enqueue_order() {
        let mut lifecycle = Lifecycle::new();
        let (generation, _) = lifecycle.begin(live_stream()).expect("idle");
        let mut receivers: Vec<_> = (0..3).map(|_| lifecycle.wait().expect("sharing")).collect();

        let waiters = lifecycle.take_waiters(generation);
        assert_eq!(waiters.len(), 3);

        for (sent, waiter) in waiters.into_iter().enumerate() {
            waiter.send(()).expect("receiver alive");
            for (index, rx) in receivers.iter_mut().enumerate() {
                if index == sent {
                    assert!(rx.try_recv().is_ok(), "waiter {index} notified out of order");
                } else if index > sent {
                    assert!(rx.try_recv().is_err(), "waiter {index} notified early");
                }
            }
        }
    }
}
