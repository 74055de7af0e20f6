//! Remote playback backend: client for a network-attached renderer.
//!
//! The renderer speaks a small JSON request/response protocol. All
//! commands are blocking round-trips performed inside this adapter
//! boundary; queries read the status snapshot cached by the most
//! recent [`PlaybackBackend::refresh`].
//!
//! Remote renderers pre-buffer: the source they report as current can
//! run ahead of the queue-index model, so this adapter only ever
//! reports source *identity* and leaves index resolution to the
//! engine's content match.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{BackendState, PlaybackBackend};
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct LoadRequest<'a> {
    source: &'a str,
}

#[derive(Debug, Serialize)]
struct EnqueueRequest<'a> {
    sources: &'a [String],
}

#[derive(Debug, Serialize)]
struct SeekRequest {
    position_ms: u64,
}

#[derive(Debug, Serialize)]
struct VolumeRequest {
    percent: u8,
}

/// Status document returned by `GET /player/status`.
#[derive(Debug, Clone, Default, Deserialize)]
struct StatusDto {
    state: String,
    source: Option<String>,
    position_ms: Option<u64>,
    duration_ms: Option<u64>,
    #[serde(default)]
    queued: usize,
}

impl StatusDto {
    fn backend_state(&self) -> BackendState {
        match self.state.as_str() {
            "playing" => BackendState::Playing,
            "paused" => BackendState::Paused,
            "error" => BackendState::Error,
            _ => BackendState::Stopped,
        }
    }
}

/// Remote renderer adapter.
pub struct RemoteBackend {
    client: Client,
    base_url: String,
    status: StatusDto,
}

impl RemoteBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(Error::config("remote backend requires a renderer URL"));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::Remote)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            status: StatusDto::default(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> Result<()> {
        self.client
            .post(self.url(path))
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        self.client
            .post(self.url(path))
            .json(body)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

impl PlaybackBackend for RemoteBackend {
    fn load(&mut self, source: &str) -> Result<()> {
        self.post_json("/player/load", &LoadRequest { source })
    }

    fn enqueue_after_current(&mut self, sources: &[String]) -> Result<()> {
        self.post_json("/player/queue", &EnqueueRequest { sources })
    }

    fn clear_queue(&mut self) -> Result<()> {
        self.post("/player/queue/clear")
    }

    fn play(&mut self) -> Result<()> {
        self.post("/player/play")
    }

    fn pause(&mut self) -> Result<()> {
        self.post("/player/pause")
    }

    fn stop(&mut self) -> Result<()> {
        self.post("/player/stop")
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.post_json("/player/seek", &SeekRequest { position_ms })
    }

    fn set_volume(&mut self, percent: u8) -> Result<()> {
        self.post_json(
            "/player/volume",
            &VolumeRequest {
                percent: percent.min(100),
            },
        )
    }

    fn refresh(&mut self) -> Result<()> {
        let status: StatusDto = self
            .client
            .get(self.url("/player/status"))
            .send()?
            .error_for_status()?
            .json()?;
        self.status = status;
        Ok(())
    }

    fn state(&self) -> BackendState {
        self.status.backend_state()
    }

    fn current_source(&self) -> Option<String> {
        self.status.source.clone()
    }

    fn position_ms(&self) -> Option<u64> {
        self.status.position_ms
    }

    fn duration_ms(&self) -> Option<u64> {
        self.status.duration_ms
    }

    fn queued_len(&self) -> usize {
        self.status.queued
    }
}
