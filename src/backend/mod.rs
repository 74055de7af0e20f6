//! Uniform command/query surface over the two playback backends.
//!
//! The engine only ever sees the [`PlaybackBackend`] trait; which
//! concrete backend sits behind it is decided exactly once at
//! construction from the configured library mode and never switched
//! mid-session.

mod decoder;
mod local;
mod remote;

pub use decoder::probe_duration;
pub use local::LocalBackend;
pub use remote::RemoteBackend;

use crate::config::BackendConfig;
use crate::error::{Error, Result};

/// Which concrete backend drives playback for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// In-process decode/render pipeline
    Local,
    /// Network-attached renderer
    Remote,
}

impl BackendMode {
    pub fn from_config(cfg: &BackendConfig) -> Result<Self> {
        match cfg.mode.as_str() {
            "local" => Ok(BackendMode::Local),
            "remote" => Ok(BackendMode::Remote),
            other => Err(Error::config(format!("unknown backend mode '{other}'"))),
        }
    }
}

/// State as reported by a backend, which is not the engine's state:
/// backends stop spuriously and report transient errors the engine
/// recovers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Error,
}

/// Narrow adapter surface the engine drives.
///
/// Commands are synchronous: the Remote implementation performs
/// blocking round-trips inside this boundary. Queries (`state`,
/// `current_source`, `position_ms`, `duration_ms`, `queued_len`) read
/// the last refreshed snapshot and never touch the wire.
pub trait PlaybackBackend {
    /// Replace the currently loaded track.
    fn load(&mut self, source: &str) -> Result<()>;

    /// Append sources to the backend's own play-through queue.
    fn enqueue_after_current(&mut self, sources: &[String]) -> Result<()>;

    /// Drop the backend queue, keeping the loaded track.
    fn clear_queue(&mut self) -> Result<()>;

    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn seek(&mut self, position_ms: u64) -> Result<()>;
    fn set_volume(&mut self, percent: u8) -> Result<()>;

    /// Pull a fresh status snapshot (network round-trip for Remote,
    /// shared-state read for Local).
    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> BackendState;

    /// Identity of the track the backend believes is current. May run
    /// ahead of the engine's queue model on pre-buffering renderers;
    /// the engine resolves it by content match only.
    fn current_source(&self) -> Option<String>;

    fn position_ms(&self) -> Option<u64>;
    fn duration_ms(&self) -> Option<u64>;

    /// Entries waiting in the backend's own queue after the current
    /// track. A spurious stop is only spurious while this is non-zero.
    fn queued_len(&self) -> usize;

    /// Out-of-band duration probe for backends whose own duration
    /// reporting is unreliable. Local opens a decode-only (muted)
    /// reader; Remote has nothing to offer.
    fn probe_duration(&self, _source: &str) -> Option<u64> {
        None
    }
}

/// Construct the backend for the configured mode.
pub fn create(cfg: &BackendConfig) -> Result<(BackendMode, Box<dyn PlaybackBackend>)> {
    let mode = BackendMode::from_config(cfg)?;
    let backend: Box<dyn PlaybackBackend> = match mode {
        BackendMode::Local => Box::new(LocalBackend::new()?),
        BackendMode::Remote => Box::new(RemoteBackend::new(&cfg.remote_url)?),
    };
    Ok((mode, backend))
}
