//! Playback engine: queue, shuffle order, and backend reconciliation.
//!
//! The engine owns the queue, the shuffle permutation, and a single
//! authoritative `current` queue index. The backend's own notion of
//! "current" is used only to *resolve* that index by content match,
//! never stored independently; backends pre-buffer, stall, and stop
//! spuriously, and everything in here exists to reconcile that noise
//! into one coherent playback state.
//!
//! Everything runs on the caller's dispatch context: operations and
//! backend callbacks mutate engine state on the same thread, so the
//! engine holds no locks of its own. Positional operations issued
//! while shuffle is active, and out-of-range indices, are routine UI
//! races: they are ignored with a debug log, not errors.

pub mod events;
pub mod progress;
pub mod queue;
pub mod shuffle;

use crossbeam_channel::Receiver;

use crate::backend::{BackendMode, BackendState, PlaybackBackend};
use crate::error::Result;
use crate::history::{HistoryRecorder, LibraryLookup, QueueStorage, SavedTrack};
use crate::model::{QueueEntry, Track};

use events::{EventSink, PlaybackState, PlayerEvent};
use progress::{PlayThresholds, PlaybackProgress};
use queue::QueueStore;

/// The playback engine.
pub struct PlaybackEngine {
    queue: QueueStore,
    backend: Box<dyn PlaybackBackend>,
    mode: BackendMode,
    history: Box<dyn HistoryRecorder>,
    events: EventSink,
    thresholds: PlayThresholds,

    state: PlaybackState,
    /// Authoritative current queue index.
    current: Option<usize>,
    /// Shuffle mode as requested by the user. The permutation itself
    /// is installed lazily: enabling shuffle on an empty queue sets
    /// the flag, and the next `finished_queueing` draws the order once
    /// entries exist.
    shuffle: bool,
    progress: PlaybackProgress,

    /// Artist/album of the last *recorded* play, for transition edges.
    last_recorded: Option<(String, String)>,
    /// Last source identity observed from the backend, to detect
    /// identity changes across polls.
    last_seen_source: Option<String>,
    /// Last source handed to the backend queue tail.
    last_enqueued: Option<String>,
    /// One-shot: backend error already retried for this track.
    error_retry_spent: bool,
    /// One-shot: the remote renderer already started the last queued
    /// item on its own; the next finished_queueing must advance, not
    /// restart it.
    auto_advance_armed: bool,

    volume: u8,
}

impl PlaybackEngine {
    /// Construct the engine around an already-chosen backend. The mode
    /// is fixed for the session.
    pub fn new(
        mode: BackendMode,
        backend: Box<dyn PlaybackBackend>,
        history: Box<dyn HistoryRecorder>,
        thresholds: PlayThresholds,
    ) -> (Self, Receiver<PlayerEvent>) {
        let (events, rx) = EventSink::channel();
        let engine = Self {
            queue: QueueStore::new(),
            backend,
            mode,
            history,
            events,
            thresholds,
            state: PlaybackState::Stopped,
            current: None,
            shuffle: false,
            progress: PlaybackProgress::default(),
            last_recorded: None,
            last_seen_source: None,
            last_enqueued: None,
            error_retry_spent: false,
            auto_advance_armed: false,
            volume: 100,
        };
        (engine, rx)
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn entries(&self) -> &[QueueEntry] {
        self.queue.entries()
    }

    pub fn shuffled(&self) -> bool {
        self.shuffle
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    // ------------------------------------------------------------------
    // Queue operations
    // ------------------------------------------------------------------

    /// Append tracks for one artist/album. Does not start playback and
    /// does not touch the permutation; both are deferred to
    /// [`Self::finished_queueing`].
    pub fn queue_tracks(
        &mut self,
        artist: &str,
        album: &str,
        tracks: impl IntoIterator<Item = (Track, String)>,
    ) {
        self.queue.append(tracks.into_iter().map(|(track, source)| QueueEntry {
            artist: artist.to_string(),
            album: album.to_string(),
            track,
            source,
        }));
        self.emit_queue_snapshot();
    }

    /// Rebuild the backend queue after a batch of queueing, optionally
    /// starting playback.
    pub fn finished_queueing(&mut self, auto_play: bool) -> Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }

        if self.shuffle {
            let n = self.queue.len();
            let extended = match self.current {
                // A track is playing: keep everything up to and
                // including it, redraw only the unvisited remainder.
                Some(current) if self.state != PlaybackState::Stopped => {
                    shuffle::extend(self.queue.permutation(), n, current)
                }
                _ => shuffle::compute(n, None),
            };
            if !extended.is_empty() {
                self.queue.set_permutation(extended);
            }
        }

        self.refill_tail()?;

        if auto_play {
            let idle = self.backend.state() == BackendState::Stopped;
            if self.mode == BackendMode::Remote && self.auto_advance_armed && idle {
                // The renderer already began the last queued item on
                // its own; restarting it would double-start.
                self.auto_advance_armed = false;
                self.next()?;
            } else if idle && self.backend.current_source().is_none() {
                self.reload_at(0)?;
            } else if idle {
                self.next()?;
            }
        }

        Ok(())
    }

    /// Start playback at an explicit queue index.
    ///
    /// Ignored while shuffle is active: positional selection is
    /// incompatible with a randomized visiting order. This is the
    /// contract, not an error.
    pub fn play(&mut self, index: usize) -> Result<()> {
        if self.shuffle {
            tracing::debug!("play({index}) ignored while shuffle is active");
            return Ok(());
        }
        if index >= self.queue.len() {
            tracing::debug!("play({index}) out of range, ignored");
            return Ok(());
        }
        // List order: logical position equals the index.
        self.reload_at(index)
    }

    /// Advance to the next logical position. No wraparound.
    pub fn next(&mut self) -> Result<()> {
        let Some(pos) = self.current.and_then(|c| self.queue.position_of(c)) else {
            // Nothing current yet: begin at the top if there is one.
            if self.queue.is_empty() {
                return Ok(());
            }
            return self.reload_at(0);
        };
        if pos + 1 >= self.queue.len() {
            tracing::debug!("next() at end of queue, ignored");
            return Ok(());
        }
        self.reload_at(pos + 1)
    }

    /// Step back to the previous logical position. No wraparound.
    pub fn prev(&mut self) -> Result<()> {
        let Some(pos) = self.current.and_then(|c| self.queue.position_of(c)) else {
            return Ok(());
        };
        if pos == 0 {
            tracing::debug!("prev() at start of queue, ignored");
            return Ok(());
        }
        self.reload_at(pos - 1)
    }

    /// Reorder one entry by stepwise adjacent swaps. Ignored under
    /// shuffle. The backend queue is rebuilt only when the move
    /// touched a position at or after the current index.
    pub fn move_queue_tracks(&mut self, from: usize, to: usize) -> Result<()> {
        if self.shuffle {
            tracing::debug!("move({from},{to}) ignored while shuffle is active");
            return Ok(());
        }

        let before_current = self.current;
        if !self.queue.move_range(from, to) {
            return Ok(());
        }

        if let Some(cur) = before_current {
            // The current index follows its entry.
            if from == cur {
                self.current = Some(to);
            } else if from < cur && to >= cur {
                self.current = Some(cur - 1);
            } else if from > cur && to <= cur {
                self.current = Some(cur + 1);
            }
        }

        self.emit_queue_snapshot();

        match before_current {
            // Both endpoints strictly before the playhead: nothing the
            // backend holds has moved.
            Some(cur) if from < cur && to < cur => {}
            _ => self.refill_tail()?,
        }

        Ok(())
    }

    /// Remove one entry. Ignored under shuffle.
    pub fn dequeue_track(&mut self, index: usize) -> Result<()> {
        if self.shuffle {
            tracing::debug!("dequeue({index}) ignored while shuffle is active");
            return Ok(());
        }
        if index >= self.queue.len() {
            return Ok(());
        }

        match self.current {
            Some(cur) if index == cur => {
                // Removing what is playing: tear the backend down and
                // come back up at the new current position. Net state
                // is unchanged, so no state announcement is made (the
                // transition dedupe takes care of that).
                let was_playing = self.state == PlaybackState::Playing;
                self.backend.stop()?;
                self.backend.clear_queue()?;
                self.queue.remove_at(index);
                self.emit_queue_snapshot();

                if self.queue.is_empty() {
                    self.current = None;
                    self.progress.reset();
                    self.transition_state(PlaybackState::Stopped);
                } else if was_playing {
                    self.reload_at(index.min(self.queue.len() - 1))?;
                } else {
                    self.current = Some(index.min(self.queue.len() - 1));
                    self.progress.reset();
                    self.transition_state(PlaybackState::Stopped);
                }
            }
            Some(cur) if index < cur => {
                // Only indices shift; the backend queue holds nothing
                // before the playhead.
                self.queue.remove_at(index);
                self.current = Some(cur - 1);
                self.emit_queue_snapshot();
            }
            _ => {
                self.queue.remove_at(index);
                self.emit_queue_snapshot();
                self.refill_tail()?;
            }
        }

        Ok(())
    }

    /// Drop the whole queue and stop the backend.
    pub fn clear(&mut self) -> Result<()> {
        self.backend.stop()?;
        self.backend.clear_queue()?;
        self.queue.clear();
        self.current = None;
        self.progress.reset();
        self.last_enqueued = None;
        self.transition_state(PlaybackState::Stopped);
        self.emit_queue_snapshot();
        Ok(())
    }

    /// Toggle shuffle. Enabling pins the current track first in a
    /// fresh permutation and rebuilds the backend tail; disabling
    /// discards the permutation (list-order correspondence returns on
    /// the next transition).
    pub fn set_shuffle_mode(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.shuffle {
            return Ok(());
        }
        self.shuffle = enabled;

        if enabled {
            // An empty queue just sets the mode; the permutation is
            // drawn when entries arrive (finished_queueing).
            if !self.queue.is_empty() {
                self.queue
                    .set_permutation(shuffle::compute(self.queue.len(), self.current));
                self.refill_tail()?;
            }
        } else {
            self.queue.clear_permutation();
        }

        self.events.emit(PlayerEvent::ShuffleAllowed(!enabled));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn pause(&mut self) -> Result<()> {
        if self.state == PlaybackState::Playing {
            self.backend.pause()?;
            self.transition_state(PlaybackState::Paused);
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state == PlaybackState::Paused {
            self.backend.play()?;
            self.transition_state(PlaybackState::Playing);
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.backend.stop()?;
        self.progress.reset();
        self.transition_state(PlaybackState::Stopped);
        Ok(())
    }

    /// Seek to an absolute position, clamped to `[0, duration]`.
    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        let target = match self.progress.duration_ms() {
            Some(duration) => position_ms.min(duration),
            None => position_ms,
        };
        self.backend.seek(target)?;
        // Backend position queries are unreliable right after a seek;
        // trust the target we asked for.
        self.progress.force_position(target);
        self.events.emit(PlayerEvent::PositionChanged {
            position_ms: target,
        });
        Ok(())
    }

    /// Seek relative to the locally tracked position.
    pub fn jump(&mut self, delta_ms: i64) -> Result<()> {
        let base = self.progress.position_ms();
        let target = if delta_ms < 0 {
            base.saturating_sub(delta_ms.unsigned_abs())
        } else {
            base.saturating_add(delta_ms as u64)
        };
        self.seek(target)
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<()> {
        let volume = volume.min(100);
        self.backend.set_volume(volume)?;
        self.volume = volume;
        self.events.emit(PlayerEvent::VolumeChanged(volume));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queue persistence
    // ------------------------------------------------------------------

    /// Persist the current queue under `name`.
    pub fn save_queue(&self, name: &str, storage: &mut dyn QueueStorage) -> Result<()> {
        let saved: Vec<SavedTrack> = self
            .queue
            .entries()
            .iter()
            .map(|e| SavedTrack {
                artist: e.artist.clone(),
                album: e.album.clone(),
                title: e.track.title.clone(),
            })
            .collect();
        storage.save_queue(name, &saved)
    }

    /// Restore a saved queue, re-resolving each row through the
    /// library. Unresolvable rows are skipped with a log line; returns
    /// how many entries were restored.
    pub fn restore_queue(
        &mut self,
        name: &str,
        storage: &mut dyn QueueStorage,
        lookup: &dyn LibraryLookup,
    ) -> Result<usize> {
        let saved = storage.load_queue(name)?;
        let mut restored = Vec::with_capacity(saved.len());
        for row in saved {
            match lookup.resolve(&row.artist, &row.album, &row.title) {
                Some(entry) => restored.push(entry),
                None => {
                    tracing::warn!(
                        "skipping unresolvable saved track {} / {} / {}",
                        row.artist,
                        row.album,
                        row.title
                    );
                }
            }
        }
        let count = restored.len();
        self.queue.append(restored);
        self.emit_queue_snapshot();
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Backend reconciliation (callbacks)
    // ------------------------------------------------------------------

    /// Pull one status snapshot from the backend and reconcile.
    ///
    /// Drivers call this on a fixed cadence; event-driven backends may
    /// instead invoke the individual handlers directly.
    pub fn poll(&mut self) -> Result<()> {
        if let Err(e) = self.backend.refresh() {
            tracing::warn!("backend status refresh failed: {e}");
            self.handle_backend_state(BackendState::Error)?;
            return Ok(());
        }

        if let Some(source) = self.backend.current_source() {
            if self.last_seen_source.as_deref() != Some(source.as_str()) {
                self.handle_source_changed(&source);
            }
        }

        if let Some(duration) = self.backend.duration_ms() {
            if duration > 0 && self.progress.duration_ms() != Some(duration) {
                self.handle_duration_changed(duration);
            }
        }

        let source_before = self.last_seen_source.clone();
        self.handle_backend_state(self.backend.state())?;

        // A recovery reload changes track identity mid-cycle; the
        // position read from this snapshot belongs to the old track.
        if self.state == PlaybackState::Playing && self.last_seen_source == source_before {
            if let Some(position) = self.backend.position_ms() {
                self.handle_progress_tick(position);
            }
        }

        Ok(())
    }

    /// The backend reports a new current source: resolve it to a queue
    /// index by content match and reset per-track accounting.
    pub fn handle_source_changed(&mut self, source: &str) {
        self.last_seen_source = Some(source.to_string());
        match self.queue.index_of_source(source) {
            Some(index) => {
                self.current = Some(index);
                self.error_retry_spent = false;
                self.progress.reset();
                self.seed_duration(index);
                self.announce_track(index);
            }
            None => {
                tracing::warn!("backend reported unknown source '{source}'");
            }
        }
    }

    /// The backend learned the duration of the loaded track.
    pub fn handle_duration_changed(&mut self, duration_ms: u64) {
        self.progress.set_duration(duration_ms);
        self.events.emit(PlayerEvent::DurationChanged { duration_ms });
    }

    /// One backend progress tick.
    pub fn handle_progress_tick(&mut self, position_ms: u64) {
        let before = self.progress.position_ms();
        let record = self.progress.on_tick(position_ms, &self.thresholds);
        if self.progress.position_ms() != before {
            self.events.emit(PlayerEvent::PositionChanged {
                position_ms: self.progress.position_ms(),
            });
        }
        if record {
            self.record_current_play();
        }
    }

    /// Reconcile a backend-reported state with the engine state,
    /// recovering from transient faults and spurious stops.
    pub fn handle_backend_state(&mut self, backend_state: BackendState) -> Result<()> {
        match backend_state {
            BackendState::Error if self.state == PlaybackState::Playing => {
                if self.error_retry_spent {
                    tracing::error!("backend error persists after retry, stopping");
                    self.transition_state(PlaybackState::Stopped);
                } else {
                    tracing::warn!("backend error while playing, retrying current track once");
                    self.error_retry_spent = true;
                    if let Some(pos) = self.current.and_then(|c| self.queue.position_of(c)) {
                        self.reload_at(pos)?;
                    }
                }
            }
            BackendState::Stopped if self.state == PlaybackState::Playing => {
                if self.backend.queued_len() > 0 {
                    // Entries are still queued: this stop is a stall,
                    // not an end of queue.
                    tracing::warn!("spurious backend stop with queued entries, recovering");
                    if self.shuffle {
                        self.backend.stop()?;
                        self.next()?;
                    } else if let Some(pos) =
                        self.current.and_then(|c| self.queue.position_of(c))
                    {
                        self.reload_at(pos)?;
                    }
                } else {
                    if self.mode == BackendMode::Remote
                        && self.last_enqueued.is_some()
                        && self.backend.current_source() == self.last_enqueued
                    {
                        // The renderer ran the tail out on its own.
                        self.auto_advance_armed = true;
                    }
                    self.transition_state(PlaybackState::Stopped);
                }
            }
            BackendState::Playing if self.state != PlaybackState::Playing => {
                self.transition_state(PlaybackState::Playing);
            }
            BackendState::Paused if self.state == PlaybackState::Playing => {
                self.transition_state(PlaybackState::Paused);
            }
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Tear down and rebuild the backend from the entry at a logical
    /// (visiting-order) position, then play.
    fn reload_at(&mut self, logical_pos: usize) -> Result<()> {
        let Some(index) = self.queue.index_at(logical_pos) else {
            return Ok(());
        };
        let Some(entry) = self.queue.get(index).cloned() else {
            return Ok(());
        };

        // The one-shot retry only rearms on a genuine identity change;
        // reloading the same faulting track must not reset it.
        let identity_changed = self.last_seen_source.as_deref() != Some(entry.source.as_str());

        self.backend.stop()?;
        self.backend.clear_queue()?;
        self.backend.load(&entry.source)?;

        let tail = self.sources_after(logical_pos);
        self.last_enqueued = tail.last().cloned().or_else(|| Some(entry.source.clone()));
        if !tail.is_empty() {
            self.backend.enqueue_after_current(&tail)?;
        }
        self.backend.play()?;

        self.current = Some(index);
        self.last_seen_source = Some(entry.source.clone());
        self.auto_advance_armed = false;
        if identity_changed {
            self.error_retry_spent = false;
        }
        self.progress.reset();
        self.seed_duration(index);
        self.announce_track(index);
        self.transition_state(PlaybackState::Playing);
        Ok(())
    }

    /// Rebuild only the backend queue tail, from the position after
    /// the current track (or the top when nothing is current).
    fn refill_tail(&mut self) -> Result<()> {
        self.backend.clear_queue()?;
        let start = match self.current.and_then(|c| self.queue.position_of(c)) {
            Some(pos) => pos + 1,
            None => 0,
        };
        let tail = self.logical_sources_from(start);
        match tail.last() {
            Some(last) => {
                self.last_enqueued = Some(last.clone());
                self.backend.enqueue_after_current(&tail)?;
            }
            // An empty tail leaves the loaded track as the last thing
            // handed to the backend; a removed trailing entry must not
            // linger as the latch identity.
            None => {
                self.last_enqueued = self
                    .current
                    .and_then(|i| self.queue.get(i))
                    .map(|e| e.source.clone());
            }
        }
        Ok(())
    }

    /// Sources strictly after a logical position, in visiting order.
    fn sources_after(&self, logical_pos: usize) -> Vec<String> {
        self.logical_sources_from(logical_pos + 1)
    }

    fn logical_sources_from(&self, logical_pos: usize) -> Vec<String> {
        self.queue
            .logical_order()
            .into_iter()
            .skip(logical_pos)
            .filter_map(|i| self.queue.get(i).map(|e| e.source.clone()))
            .collect()
    }

    /// Seed per-track duration: prefer the container hint carried on
    /// the entry, fall back to the Local out-of-band probe when the
    /// pipeline cannot be trusted to report one.
    fn seed_duration(&mut self, index: usize) {
        let Some(entry) = self.queue.get(index) else {
            return;
        };
        if let Some(duration) = entry.track.duration_ms {
            self.handle_duration_changed(duration);
        } else if self.mode == BackendMode::Local {
            if let Some(duration) = self.backend.probe_duration(&entry.source) {
                self.handle_duration_changed(duration);
            }
        }
    }

    fn announce_track(&mut self, index: usize) {
        let Some(entry) = self.queue.get(index) else {
            return;
        };
        self.events.emit(PlayerEvent::TrackChanged {
            index,
            artist: entry.artist.clone(),
            album: entry.album.clone(),
            track: entry.track.title.clone(),
            bitrate: entry.track.bitrate,
            sample_rate: entry.track.sample_rate,
            bits_per_sample: entry.track.bits_per_sample,
            quality: entry.track.quality,
        });
    }

    /// Record the current track as played. Persistence failures are
    /// logged and swallowed: playback never stops because the history
    /// store is unhappy.
    fn record_current_play(&mut self) {
        let Some(entry) = self.current.and_then(|i| self.queue.get(i)).cloned() else {
            return;
        };

        match self.history.record_play(
            &entry.artist,
            &entry.album,
            &entry.track.title,
            entry.track.sample_rate,
            entry.track.bits_per_sample,
        ) {
            Ok(record) => {
                self.events.emit(PlayerEvent::PlayHistoryUpdated {
                    artist: entry.artist.clone(),
                    album: entry.album.clone(),
                    track: entry.track.title.clone(),
                    play_count: record.play_count,
                    timestamp_ms: record.timestamp_ms,
                });

                // Shuffled transitions are not meaningful statistics.
                if !self.shuffle {
                    if let Some((prev_artist, prev_album)) = &self.last_recorded {
                        if *prev_artist != entry.artist || *prev_album != entry.album {
                            if let Err(e) = self.history.record_transition(
                                prev_artist,
                                prev_album,
                                &entry.artist,
                                &entry.album,
                            ) {
                                tracing::warn!("transition record failed: {e}");
                            }
                        }
                    }
                }
                self.last_recorded = Some((entry.artist, entry.album));
            }
            Err(e) => {
                tracing::warn!("play record failed: {e}");
            }
        }
    }

    fn transition_state(&mut self, next: PlaybackState) {
        if self.state != next {
            self.state = next;
            self.events.emit(PlayerEvent::StateChanged(next));
        }
    }

    fn emit_queue_snapshot(&self) {
        self.events
            .emit(PlayerEvent::QueueSnapshot(self.queue.entries().to_vec()));
    }
}
