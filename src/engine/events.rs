//! Notifications emitted by the engine for UI/bridge collaborators.
//!
//! Events travel over a bounded crossbeam channel. Emission never
//! blocks the engine: if the consumer lags, the oldest pending event
//! for that send is dropped on the floor and a debug line notes it.

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::model::{Quality, QueueEntry};

/// Engine playback state, as announced to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Notification payloads emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged(PlaybackState),
    TrackChanged {
        index: usize,
        artist: String,
        album: String,
        track: String,
        bitrate: u32,
        sample_rate: u32,
        bits_per_sample: u16,
        quality: Quality,
    },
    PositionChanged {
        position_ms: u64,
    },
    DurationChanged {
        duration_ms: u64,
    },
    QueueSnapshot(Vec<QueueEntry>),
    ShuffleAllowed(bool),
    VolumeChanged(u8),
    PlayHistoryUpdated {
        artist: String,
        album: String,
        track: String,
        play_count: u32,
        timestamp_ms: i64,
    },
}

/// Non-blocking sender half used by the engine.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<PlayerEvent>,
}

impl EventSink {
    /// Create a sink plus the receiver collaborators drain.
    pub fn channel() -> (Self, Receiver<PlayerEvent>) {
        let (tx, rx) = bounded(256);
        (Self { tx }, rx)
    }

    /// Emit an event; drops it rather than block a full channel.
    pub fn emit(&self, event: PlayerEvent) {
        if self.tx.try_send(event).is_err() {
            tracing::debug!("event channel full, notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, rx) = EventSink::channel();
        sink.emit(PlayerEvent::StateChanged(PlaybackState::Playing));
        sink.emit(PlayerEvent::PositionChanged { position_ms: 1234 });

        assert_eq!(
            rx.try_recv().unwrap(),
            PlayerEvent::StateChanged(PlaybackState::Playing)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            PlayerEvent::PositionChanged { position_ms: 1234 }
        );
    }

    #[test]
    fn test_full_channel_never_blocks() {
        let (sink, rx) = EventSink::channel();
        for i in 0..1000 {
            sink.emit(PlayerEvent::PositionChanged { position_ms: i });
        }
        // Receiver still sees the earliest events; the overflow was dropped.
        assert_eq!(
            rx.try_recv().unwrap(),
            PlayerEvent::PositionChanged { position_ms: 0 }
        );
    }
}
