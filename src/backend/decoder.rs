//! symphonia decode wrapper for the local pipeline.
//!
//! Also provides the out-of-band duration probe: opening a file here
//! attaches no output, so a probe is inherently muted and can be
//! discarded as soon as the container duration is known.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::error::{Error, Result};

/// Interleaved f32 samples for one decoded packet.
pub struct DecodedChunk {
    pub samples: Vec<f32>,
    /// Packet timestamp from the start of the track (ms)
    pub timestamp_ms: u64,
}

/// Streaming decoder over one audio source.
pub struct Decoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    duration_ms: Option<u64>,
    time_base: Option<TimeBase>,
}

impl Decoder {
    /// Open a source for decoding.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::decode(format!("{}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::InvalidFormat(e.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::InvalidFormat("no audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::decode("unknown sample rate"))?;

        let time_base = codec_params.time_base;
        let duration_ms = codec_params.n_frames.map(|n_frames| match time_base {
            Some(tb) => {
                let time = tb.calc_time(n_frames);
                (time.seconds as f64 * 1000.0 + time.frac * 1000.0) as u64
            }
            None => (n_frames as f64 * 1000.0 / sample_rate as f64) as u64,
        });

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::decode(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            duration_ms,
            time_base,
        })
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Seek to an absolute position.
    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        let seek_to = SeekTo::Time {
            time: Time::from(position_ms as f64 / 1000.0),
            track_id: Some(self.track_id),
        };

        self.reader
            .seek(SeekMode::Accurate, seek_to)
            .map_err(|e| Error::decode(format!("seek failed: {e}")))?;

        // Codec state is stale after a discontinuity.
        self.decoder.reset();
        Ok(())
    }

    /// Decode the next packet. Returns `Ok(None)` at end of stream.
    pub fn next_chunk(&mut self) -> Result<Option<DecodedChunk>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(Error::decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let timestamp_ms = match self.time_base {
                Some(tb) => {
                    let time = tb.calc_time(packet.ts());
                    (time.seconds as f64 * 1000.0 + time.frac * 1000.0) as u64
                }
                None => 0,
            };

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                // Skip a corrupt frame rather than abort the track.
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(Error::decode(e.to_string())),
            };

            return Ok(Some(DecodedChunk {
                samples: interleave_f32(&decoded),
                timestamp_ms,
            }));
        }
    }
}

/// Convert a planar decode buffer to interleaved f32 samples.
fn interleave_f32(buffer: &AudioBufferRef) -> Vec<f32> {
    macro_rules! interleave {
        ($buf:expr, $convert:expr) => {{
            let planes = $buf.planes();
            let plane_slice = planes.planes();
            let frames = $buf.frames();
            let mut output = Vec::with_capacity(frames * plane_slice.len());
            for frame in 0..frames {
                for plane in plane_slice {
                    output.push($convert(plane[frame]));
                }
            }
            output
        }};
    }

    match buffer {
        AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
        AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => {
            interleave!(buf, |s: symphonia::core::sample::i24| s.0 as f32 / 8_388_608.0)
        }
        AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / 2_147_483_648.0),
        AudioBufferRef::U8(buf) => interleave!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => Vec::new(),
    }
}

/// Out-of-band duration probe: decode-only open, no output attached.
///
/// Returns `None` when the container does not declare its length or
/// the file cannot be opened; the caller falls back to whatever the
/// live pipeline eventually reports.
pub fn probe_duration(source: &str) -> Option<u64> {
    match Decoder::open(Path::new(source)) {
        Ok(decoder) => decoder.duration_ms(),
        Err(e) => {
            tracing::debug!("duration probe failed for {source}: {e}");
            None
        }
    }
}
