//! Local playback backend: in-process decode/render pipeline.
//!
//! A decoder thread pulls commands off a crossbeam channel, decodes
//! with symphonia, and feeds interleaved f32 chunks to the cpal output
//! callback through a small bounded channel (the blocking send is what
//! paces decoding to real time). Pipeline status lives in a shared
//! `RwLock` snapshot that the adapter queries without touching the
//! audio thread.
//!
//! The pipeline owns its own play-through queue and advances into it
//! autonomously when a track ends, which is exactly why the engine
//! must treat a "stopped" report with entries still queued as a stall
//! rather than an end-of-queue.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::RwLock;

use super::{BackendState, PlaybackBackend};
use crate::error::{Error, Result};

use super::decoder::{DecodedChunk, Decoder};

/// Commands handled by the decoder thread.
enum PipelineCommand {
    Load(String),
    Play,
    Pause,
    Stop,
    Seek(u64),
    Shutdown,
}

/// Snapshot shared between the adapter, the decoder thread, and the
/// output callback.
#[derive(Default)]
struct PipelineState {
    status: BackendState,
    /// Last loaded source; survives a natural end of queue so the
    /// engine can tell "finished" from "never started".
    current: Option<String>,
    position_ms: u64,
    duration_ms: Option<u64>,
    /// Play-through queue the pipeline advances into on its own.
    pending: VecDeque<String>,
    volume: f32,
}

/// Local backend adapter.
pub struct LocalBackend {
    state: Arc<RwLock<PipelineState>>,
    command_tx: Sender<PipelineCommand>,
    _stream: Stream,
    _decoder_thread: JoinHandle<()>,
}

impl LocalBackend {
    pub fn new() -> Result<Self> {
        let state = Arc::new(RwLock::new(PipelineState {
            volume: 1.0,
            ..PipelineState::default()
        }));

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::backend("no audio output device found"))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| Error::backend(e.to_string()))?;
        tracing::info!(
            "local pipeline on '{}': {}Hz, {} channels",
            device_name,
            supported.sample_rate().0,
            supported.channels()
        );

        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        // Decoded audio travels decoder thread -> output callback; the
        // small bound paces decoding to playback speed.
        let (chunk_tx, chunk_rx) = bounded::<DecodedChunk>(8);
        let (command_tx, command_rx) = bounded(32);

        let thread_state = Arc::clone(&state);
        let decoder_thread = thread::Builder::new()
            .name("playdeck-decode".to_string())
            .spawn(move || decoder_thread_main(thread_state, command_rx, chunk_tx))
            .map_err(|e| Error::backend(e.to_string()))?;

        let callback_state = Arc::clone(&state);
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_output_stream::<f32>(&device, &stream_config, chunk_rx, callback_state)
            }
            SampleFormat::I16 => {
                build_output_stream::<i16>(&device, &stream_config, chunk_rx, callback_state)
            }
            SampleFormat::U16 => {
                build_output_stream::<u16>(&device, &stream_config, chunk_rx, callback_state)
            }
            format => Err(Error::backend(format!("unsupported sample format {format:?}"))),
        }?;

        stream.play().map_err(|e| Error::backend(e.to_string()))?;

        Ok(Self {
            state,
            command_tx,
            _stream: stream,
            _decoder_thread: decoder_thread,
        })
    }

    fn send(&self, command: PipelineCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| Error::backend("pipeline command channel closed"))
    }
}

impl PlaybackBackend for LocalBackend {
    fn load(&mut self, source: &str) -> Result<()> {
        self.send(PipelineCommand::Load(source.to_string()))
    }

    fn enqueue_after_current(&mut self, sources: &[String]) -> Result<()> {
        let mut state = self.state.write();
        state.pending.extend(sources.iter().cloned());
        Ok(())
    }

    fn clear_queue(&mut self) -> Result<()> {
        self.state.write().pending.clear();
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.send(PipelineCommand::Play)
    }

    fn pause(&mut self) -> Result<()> {
        self.send(PipelineCommand::Pause)
    }

    fn stop(&mut self) -> Result<()> {
        self.send(PipelineCommand::Stop)
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.send(PipelineCommand::Seek(position_ms))
    }

    fn set_volume(&mut self, percent: u8) -> Result<()> {
        self.state.write().volume = f32::from(percent.min(100)) / 100.0;
        Ok(())
    }

    fn state(&self) -> BackendState {
        self.state.read().status
    }

    fn current_source(&self) -> Option<String> {
        self.state.read().current.clone()
    }

    fn position_ms(&self) -> Option<u64> {
        let state = self.state.read();
        state.current.as_ref().map(|_| state.position_ms)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.state.read().duration_ms
    }

    fn queued_len(&self) -> usize {
        self.state.read().pending.len()
    }

    fn probe_duration(&self, source: &str) -> Option<u64> {
        super::decoder::probe_duration(source)
    }
}

impl Drop for LocalBackend {
    fn drop(&mut self) {
        let _ = self.command_tx.send(PipelineCommand::Shutdown);
    }
}

/// Build the output stream for one sample format. The callback applies
/// volume, publishes chunk timestamps as the pipeline position, and
/// emits silence while not playing.
fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    chunk_rx: Receiver<DecodedChunk>,
    state: Arc<RwLock<PipelineState>>,
) -> Result<Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut carry: Option<(DecodedChunk, usize)> = None;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let (volume, playing) = {
                    let s = state.read();
                    (s.volume, s.status == BackendState::Playing)
                };

                if !playing {
                    data.fill(T::from_sample(0.0f32));
                    return;
                }

                let mut written = 0;
                while written < data.len() {
                    if carry.is_none() {
                        match chunk_rx.try_recv() {
                            Ok(chunk) => {
                                state.write().position_ms = chunk.timestamp_ms;
                                carry = Some((chunk, 0));
                            }
                            Err(_) => {
                                // Underrun: pad with silence.
                                data[written..].fill(T::from_sample(0.0f32));
                                return;
                            }
                        }
                    }

                    if let Some((ref chunk, ref mut consumed)) = carry {
                        let n = (chunk.samples.len() - *consumed).min(data.len() - written);
                        for i in 0..n {
                            data[written + i] =
                                T::from_sample(chunk.samples[*consumed + i] * volume);
                        }
                        *consumed += n;
                        written += n;
                        if *consumed >= chunk.samples.len() {
                            carry = None;
                        }
                    }
                }
            },
            |err| tracing::error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| Error::backend(e.to_string()))
}

/// Decoder thread: command handling plus decode pacing.
struct DecodeContext {
    decoder: Option<Decoder>,
}

impl DecodeContext {
    /// Open `source` and publish its properties. A failed open reports
    /// an error state for the engine to recover from.
    fn load(&mut self, source: String, state: &RwLock<PipelineState>) {
        match Decoder::open(Path::new(&source)) {
            Ok(decoder) => {
                let mut s = state.write();
                s.current = Some(source);
                s.position_ms = 0;
                s.duration_ms = decoder.duration_ms();
                if s.status == BackendState::Error {
                    s.status = BackendState::Stopped;
                }
                self.decoder = Some(decoder);
            }
            Err(e) => {
                tracing::error!("failed to load {source}: {e}");
                let mut s = state.write();
                s.current = Some(source);
                s.status = BackendState::Error;
                self.decoder = None;
            }
        }
    }

    /// Returns false when the thread should exit.
    fn handle(&mut self, command: PipelineCommand, state: &RwLock<PipelineState>) -> bool {
        match command {
            PipelineCommand::Load(source) => self.load(source, state),
            PipelineCommand::Play => {
                if self.decoder.is_some() {
                    state.write().status = BackendState::Playing;
                } else {
                    // Play with nothing loaded starts the pending queue.
                    let next = state.write().pending.pop_front();
                    if let Some(source) = next {
                        self.load(source, state);
                        if self.decoder.is_some() {
                            state.write().status = BackendState::Playing;
                        }
                    }
                }
            }
            PipelineCommand::Pause => {
                let mut s = state.write();
                if s.status == BackendState::Playing {
                    s.status = BackendState::Paused;
                }
            }
            PipelineCommand::Stop => {
                let mut s = state.write();
                s.status = BackendState::Stopped;
                s.position_ms = 0;
                self.decoder = None;
            }
            PipelineCommand::Seek(position_ms) => {
                if let Some(ref mut decoder) = self.decoder {
                    if let Err(e) = decoder.seek(position_ms) {
                        tracing::warn!("seek failed: {e}");
                    } else {
                        state.write().position_ms = position_ms;
                    }
                }
            }
            PipelineCommand::Shutdown => return false,
        }
        true
    }

    /// Decode one chunk; advance into the pending queue at track end.
    /// Returns false when the output side is gone.
    fn pump(&mut self, chunk_tx: &Sender<DecodedChunk>, state: &RwLock<PipelineState>) -> bool {
        let Some(ref mut decoder) = self.decoder else {
            return true;
        };

        match decoder.next_chunk() {
            Ok(Some(chunk)) => chunk_tx.send(chunk).is_ok(),
            Ok(None) => {
                let next = state.write().pending.pop_front();
                match next {
                    Some(source) => {
                        self.load(source, state);
                        if self.decoder.is_none() {
                            state.write().status = BackendState::Error;
                        }
                    }
                    None => {
                        tracing::info!("pipeline reached end of queue");
                        let mut s = state.write();
                        s.status = BackendState::Stopped;
                        self.decoder = None;
                    }
                }
                true
            }
            Err(e) => {
                tracing::error!("decode fault: {e}");
                state.write().status = BackendState::Error;
                self.decoder = None;
                true
            }
        }
    }
}

fn decoder_thread_main(
    state: Arc<RwLock<PipelineState>>,
    command_rx: Receiver<PipelineCommand>,
    chunk_tx: Sender<DecodedChunk>,
) {
    let mut ctx = DecodeContext { decoder: None };

    loop {
        let playing = state.read().status == BackendState::Playing;

        // Block on commands when idle, poll while playing.
        let command = if playing {
            command_rx.try_recv().ok()
        } else {
            match command_rx.recv() {
                Ok(command) => Some(command),
                Err(_) => break, // adapter dropped
            }
        };

        if let Some(command) = command {
            if !ctx.handle(command, &state) {
                break;
            }
            continue;
        }

        if state.read().status == BackendState::Playing {
            if !ctx.pump(&chunk_tx, &state) {
                break;
            }
        } else if playing {
            thread::sleep(Duration::from_millis(10));
        }
    }
}
