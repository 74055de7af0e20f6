//! Core data model: tracks, queue entries, and tag reading.
//!
//! Uses the lofty crate for format-independent metadata access so the
//! CLI can turn plain file paths into fully described queue entries.

use std::path::Path;

use anyhow::{Context, Result};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;

/// Coarse signal-quality label attached to track-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Unknown,
    Lossy,
    Lossless,
}

impl Quality {
    /// Derive a quality label from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "flac" | "wav" | "aiff" | "alac" | "ape" => Quality::Lossless,
            "mp3" | "ogg" | "opus" | "aac" | "m4a" | "wma" => Quality::Lossy,
            _ => Quality::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Quality::Unknown => "unknown",
            Quality::Lossy => "lossy",
            Quality::Lossless => "lossless",
        }
    }
}

/// A single playable track.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Track {
    pub title: String,
    /// Container duration if the tags carried one (ms)
    pub duration_ms: Option<u64>,
    /// Average bitrate in kbps, when known
    pub bitrate: u32,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub quality: Quality,
}

/// One entry in the play queue: an `(artist, album, track)` reference
/// plus the resolved playable source. Sequence order in the queue is
/// the user-visible order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub artist: String,
    pub album: String,
    pub track: Track,
    /// Opaque source locator handed to the backend (file path or URL).
    /// Backends report this identity back; the engine resolves it to a
    /// queue index by content match, never by trusting a raw index.
    pub source: String,
}

impl QueueEntry {
    /// Short display form used in log lines.
    pub fn display(&self) -> String {
        format!("{} / {} / {}", self.artist, self.album, self.track.title)
    }
}

/// Read tags and signal properties from an audio file.
///
/// Missing tags fall back to "Unknown ..." placeholders rather than
/// failing; an unreadable file is an error.
pub fn read_track(path: &Path) -> Result<QueueEntry> {
    let tagged_file = Probe::open(path)
        .context("Failed to open file for probing")?
        .read()
        .context("Failed to read file metadata")?;

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let title = tag
        .and_then(|t| t.title().map(|s| s.to_string()))
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown Title".to_string())
        });

    let artist = tag
        .and_then(|t| t.artist().map(|s| s.to_string()))
        .unwrap_or_else(|| "Unknown Artist".to_string());

    let album = tag
        .and_then(|t| t.album().map(|s| s.to_string()))
        .unwrap_or_else(|| "Unknown Album".to_string());

    let properties = tagged_file.properties();
    let duration = properties.duration();
    let duration_ms = if duration.is_zero() {
        None
    } else {
        Some(duration.as_millis() as u64)
    };

    let quality = path
        .extension()
        .map(|e| Quality::from_extension(&e.to_string_lossy()))
        .unwrap_or_default();

    Ok(QueueEntry {
        artist,
        album,
        track: Track {
            title,
            duration_ms,
            bitrate: properties.audio_bitrate().unwrap_or(0),
            sample_rate: properties.sample_rate().unwrap_or(0),
            bits_per_sample: properties.bit_depth().map(u16::from).unwrap_or(16),
            quality,
        },
        source: path.to_string_lossy().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_from_extension() {
        assert_eq!(Quality::from_extension("flac"), Quality::Lossless);
        assert_eq!(Quality::from_extension("FLAC"), Quality::Lossless);
        assert_eq!(Quality::from_extension("mp3"), Quality::Lossy);
        assert_eq!(Quality::from_extension("xyz"), Quality::Unknown);
    }

    #[test]
    fn test_read_track_missing_file() {
        let result = read_track(Path::new("/nonexistent/file.mp3"));
        assert!(result.is_err());
    }

    #[test]
    fn test_entry_display() {
        let entry = QueueEntry {
            artist: "Artist".into(),
            album: "Album".into(),
            track: Track {
                title: "Song".into(),
                ..Track::default()
            },
            source: "/music/song.flac".into(),
        };
        assert_eq!(entry.display(), "Artist / Album / Song");
    }
}
