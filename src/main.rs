//! playdeck - queue-centred audio playback for local files and remote
//! renderers.
//!
//! The engine keeps one authoritative play queue and reconciles it
//! against whichever backend was configured: the in-process
//! decode/render pipeline or a network-attached renderer. The CLI
//! queues files, drives the engine on a fixed polling cadence, and
//! logs the notifications it emits.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod model;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use engine::PlaybackEngine;
use engine::events::{PlaybackState, PlayerEvent};
use engine::progress::PlayThresholds;
use history::{LibraryLookup, SqliteHistory};
use model::{QueueEntry, read_track};

/// Engine polling cadence while playback is running.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// playdeck CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue audio files and play them
    Play {
        /// Files or directories to queue, in order
        paths: Vec<PathBuf>,
        /// Visit the queue in shuffled order
        #[arg(long)]
        shuffle: bool,
        /// Queue without starting playback
        #[arg(long)]
        no_autoplay: bool,
        /// Also save the queue under this name
        #[arg(long)]
        save: Option<String>,
    },
    /// Restore a previously saved queue and play it
    Restore {
        /// Name the queue was saved under
        name: String,
        /// Files or directories to resolve the saved tracks against
        paths: Vec<PathBuf>,
        /// Visit the queue in shuffled order
        #[arg(long)]
        shuffle: bool,
        /// Queue without starting playback
        #[arg(long)]
        no_autoplay: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("playdeck=info".parse().unwrap()))
        .init();

    let config = Config::load();

    match cli.command {
        Commands::Play {
            paths,
            shuffle,
            no_autoplay,
            save,
        } => cmd_play(&config, &paths, shuffle, no_autoplay, save),
        Commands::Restore {
            name,
            paths,
            shuffle,
            no_autoplay,
        } => cmd_restore(&config, &name, &paths, shuffle, no_autoplay),
    }
}

fn cmd_play(
    config: &Config,
    paths: &[PathBuf],
    shuffle: bool,
    no_autoplay: bool,
    save: Option<String>,
) -> anyhow::Result<()> {
    if paths.is_empty() {
        bail!("nothing to play: no paths given");
    }

    let entries = collect_entries(paths);
    if entries.is_empty() {
        bail!("no readable audio files found");
    }
    info!("queueing {} tracks", entries.len());

    let (mut engine, events) = build_engine(config)?;
    for entry in &entries {
        engine.queue_tracks(
            &entry.artist,
            &entry.album,
            [(entry.track.clone(), entry.source.clone())],
        );
    }

    if let Some(name) = save {
        let mut storage = open_history(config)?;
        engine.save_queue(&name, &mut storage)?;
        info!("saved queue '{name}'");
    }

    if shuffle {
        engine.set_shuffle_mode(true)?;
    }
    engine.finished_queueing(!no_autoplay)?;

    if no_autoplay {
        info!("queued without playing");
        return Ok(());
    }
    drive(engine, events)
}

fn cmd_restore(
    config: &Config,
    name: &str,
    paths: &[PathBuf],
    shuffle: bool,
    no_autoplay: bool,
) -> anyhow::Result<()> {
    let lookup = TagIndex::build(paths);
    let (mut engine, events) = build_engine(config)?;

    let mut storage = open_history(config)?;
    let restored = engine.restore_queue(name, &mut storage, &lookup)?;
    if restored == 0 {
        bail!("queue '{name}' restored no tracks (unknown name, or nothing resolved)");
    }
    info!("restored {restored} tracks from queue '{name}'");

    if shuffle {
        engine.set_shuffle_mode(true)?;
    }
    engine.finished_queueing(!no_autoplay)?;

    if no_autoplay {
        info!("queued without playing");
        return Ok(());
    }
    drive(engine, events)
}

fn build_engine(config: &Config) -> anyhow::Result<(PlaybackEngine, Receiver<PlayerEvent>)> {
    let (mode, backend) = backend::create(&config.backend).context("backend setup failed")?;
    let history = open_history(config)?;
    let (mut engine, events) = PlaybackEngine::new(
        mode,
        backend,
        Box::new(history),
        PlayThresholds::from(&config.playback),
    );
    engine.set_volume(config.playback.volume)?;
    Ok((engine, events))
}

fn open_history(config: &Config) -> anyhow::Result<SqliteHistory> {
    let path = config.db_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    SqliteHistory::open(&path)
        .with_context(|| format!("failed to open history database {}", path.display()))
}

/// Poll the engine on a fixed cadence, logging its notifications,
/// until playback reaches a stop.
fn drive(mut engine: PlaybackEngine, events: Receiver<PlayerEvent>) -> anyhow::Result<()> {
    loop {
        if let Err(e) = engine.poll() {
            warn!("poll failed: {e}");
        }
        for event in events.try_iter() {
            log_event(&event);
        }
        if engine.state() == PlaybackState::Stopped {
            info!("playback finished");
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn log_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::StateChanged(state) => info!("state: {state:?}"),
        PlayerEvent::TrackChanged {
            artist,
            album,
            track,
            quality,
            ..
        } => info!("now playing: {artist} / {album} / {track} [{}]", quality.label()),
        PlayerEvent::PlayHistoryUpdated {
            artist,
            track,
            play_count,
            ..
        } => info!("recorded play #{play_count}: {artist} / {track}"),
        PlayerEvent::DurationChanged { duration_ms } => debug!("duration: {duration_ms}ms"),
        PlayerEvent::QueueSnapshot(entries) => debug!("queue: {} entries", entries.len()),
        PlayerEvent::ShuffleAllowed(allowed) => debug!("positional selection allowed: {allowed}"),
        PlayerEvent::VolumeChanged(volume) => debug!("volume: {volume}"),
        PlayerEvent::PositionChanged { position_ms } => {
            tracing::trace!("position: {position_ms}ms");
        }
    }
}

/// Expand files and one level of directory contents into queue entries,
/// in a stable order. Unreadable files are skipped with a log line.
fn collect_entries(paths: &[PathBuf]) -> Vec<QueueEntry> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            match std::fs::read_dir(path) {
                Ok(dir) => {
                    let mut children: Vec<PathBuf> =
                        dir.filter_map(|e| e.ok()).map(|e| e.path()).collect();
                    children.sort();
                    files.extend(children.into_iter().filter(|p| p.is_file()));
                }
                Err(e) => warn!("cannot read directory {}: {e}", path.display()),
            }
        } else {
            files.push(path.clone());
        }
    }

    let mut entries = Vec::new();
    for file in files {
        match read_track(&file) {
            Ok(entry) => entries.push(entry),
            Err(e) => debug!("skipping {}: {e:#}", file.display()),
        }
    }
    entries
}

/// Tag-derived lookup for restoring saved queues: reads the tags of the
/// candidate files once and resolves saved `(artist, album, title)`
/// rows against them, case-insensitively.
struct TagIndex {
    entries: Vec<QueueEntry>,
}

impl TagIndex {
    fn build(paths: &[PathBuf]) -> Self {
        Self {
            entries: collect_entries(paths),
        }
    }
}

impl LibraryLookup for TagIndex {
    fn resolve(&self, artist: &str, album: &str, title: &str) -> Option<QueueEntry> {
        self.entries
            .iter()
            .find(|e| {
                e.artist.eq_ignore_ascii_case(artist)
                    && e.album.eq_ignore_ascii_case(album)
                    && e.track.title.eq_ignore_ascii_case(title)
            })
            .cloned()
    }
}
