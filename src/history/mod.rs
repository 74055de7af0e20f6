//! Play-history and saved-queue persistence contracts.
//!
//! The engine consumes these as thin trait objects so it can be
//! constructed and tested without a real database; [`SqliteHistory`]
//! is the production implementation over a small SQLite schema.
//!
//! # Tables
//!
//! * `play_history` - per-track play counts and last-played timestamps.
//! * `transitions` - artist/album transition edge counts.
//! * `saved_queues` - named, ordered queue snapshots.
//!
//! Most statements go through [`rusqlite::Connection::prepare_cached`]
//! to avoid re-parsing SQL on every progress-driven record.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::model::QueueEntry;

/// Result of recording one play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayRecord {
    /// Total play count for this track after the record
    pub play_count: u32,
    /// Timestamp the play was recorded at (ms since the Unix epoch)
    pub timestamp_ms: i64,
}

/// One row of a persisted queue: the track reference without its
/// resolved source, which is re-resolved on restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTrack {
    pub artist: String,
    pub album: String,
    pub title: String,
}

/// Persists play counts and artist/album transition edges.
pub trait HistoryRecorder {
    /// Record one play; returns the updated count and its timestamp.
    fn record_play(
        &mut self,
        artist: &str,
        album: &str,
        track: &str,
        sample_rate: u32,
        bits_per_sample: u16,
    ) -> Result<PlayRecord>;

    /// Record an artist/album transition edge; the returned count is
    /// informational and callers are free to ignore it.
    fn record_transition(
        &mut self,
        from_artist: &str,
        from_album: &str,
        to_artist: &str,
        to_album: &str,
    ) -> Result<u32>;
}

/// Named queue snapshots.
pub trait QueueStorage {
    fn load_queue(&mut self, name: &str) -> Result<Vec<SavedTrack>>;
    fn save_queue(&mut self, name: &str, entries: &[SavedTrack]) -> Result<()>;
}

/// Resolves a track reference back to a playable queue entry when
/// restoring a saved queue.
pub trait LibraryLookup {
    fn resolve(&self, artist: &str, album: &str, title: &str) -> Option<QueueEntry>;
}

/// SQLite-backed implementation of both persistence contracts.
pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    /// Open (or create) the history database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.set_prepared_statement_cache_capacity(32);

        conn.execute_batch(
            "BEGIN;

            CREATE TABLE IF NOT EXISTS play_history (
                artist TEXT NOT NULL COLLATE NOCASE,
                album TEXT NOT NULL COLLATE NOCASE,
                track TEXT NOT NULL COLLATE NOCASE,
                play_count INTEGER NOT NULL DEFAULT 0,
                last_played_ms INTEGER NOT NULL DEFAULT 0,
                sample_rate INTEGER NOT NULL DEFAULT 0,
                bits_per_sample INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (artist, album, track)
            );

            CREATE TABLE IF NOT EXISTS transitions (
                from_artist TEXT NOT NULL COLLATE NOCASE,
                from_album TEXT NOT NULL COLLATE NOCASE,
                to_artist TEXT NOT NULL COLLATE NOCASE,
                to_album TEXT NOT NULL COLLATE NOCASE,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (from_artist, from_album, to_artist, to_album)
            );

            CREATE TABLE IF NOT EXISTS saved_queues (
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                artist TEXT NOT NULL,
                album TEXT NOT NULL,
                track TEXT NOT NULL,
                PRIMARY KEY (name, position)
            );

            COMMIT;",
        )?;

        Ok(Self { conn })
    }
}

impl HistoryRecorder for SqliteHistory {
    fn record_play(
        &mut self,
        artist: &str,
        album: &str,
        track: &str,
        sample_rate: u32,
        bits_per_sample: u16,
    ) -> Result<PlayRecord> {
        let timestamp_ms = Utc::now().timestamp_millis();

        self.conn
            .prepare_cached(
                "INSERT INTO play_history
                    (artist, album, track, play_count, last_played_ms, sample_rate, bits_per_sample)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)
                 ON CONFLICT (artist, album, track) DO UPDATE SET
                    play_count = play_count + 1,
                    last_played_ms = excluded.last_played_ms,
                    sample_rate = excluded.sample_rate,
                    bits_per_sample = excluded.bits_per_sample",
            )?
            .execute(params![
                artist,
                album,
                track,
                timestamp_ms,
                sample_rate,
                bits_per_sample
            ])?;

        let play_count: u32 = self
            .conn
            .prepare_cached(
                "SELECT play_count FROM play_history
                 WHERE artist = ?1 AND album = ?2 AND track = ?3",
            )?
            .query_row(params![artist, album, track], |row| row.get(0))?;

        Ok(PlayRecord {
            play_count,
            timestamp_ms,
        })
    }

    fn record_transition(
        &mut self,
        from_artist: &str,
        from_album: &str,
        to_artist: &str,
        to_album: &str,
    ) -> Result<u32> {
        self.conn
            .prepare_cached(
                "INSERT INTO transitions (from_artist, from_album, to_artist, to_album, count)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT (from_artist, from_album, to_artist, to_album)
                 DO UPDATE SET count = count + 1",
            )?
            .execute(params![from_artist, from_album, to_artist, to_album])?;

        let count: u32 = self
            .conn
            .prepare_cached(
                "SELECT count FROM transitions
                 WHERE from_artist = ?1 AND from_album = ?2
                   AND to_artist = ?3 AND to_album = ?4",
            )?
            .query_row(params![from_artist, from_album, to_artist, to_album], |row| {
                row.get(0)
            })?;

        Ok(count)
    }
}

impl QueueStorage for SqliteHistory {
    fn load_queue(&mut self, name: &str) -> Result<Vec<SavedTrack>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT artist, album, track FROM saved_queues
             WHERE name = ?1 ORDER BY position",
        )?;

        let rows = stmt.query_map(params![name], |row| {
            Ok(SavedTrack {
                artist: row.get(0)?,
                album: row.get(1)?,
                title: row.get(2)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn save_queue(&mut self, name: &str, entries: &[SavedTrack]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM saved_queues WHERE name = ?1", params![name])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO saved_queues (name, position, artist, album, track)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, entry) in entries.iter().enumerate() {
                stmt.execute(params![
                    name,
                    position as i64,
                    entry.artist,
                    entry.album,
                    entry.title
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_play_counts_up() {
        let mut history = SqliteHistory::open_in_memory().unwrap();

        let first = history
            .record_play("Artist", "Album", "Song", 44_100, 16)
            .unwrap();
        assert_eq!(first.play_count, 1);
        assert!(first.timestamp_ms > 0);

        let second = history
            .record_play("Artist", "Album", "Song", 44_100, 16)
            .unwrap();
        assert_eq!(second.play_count, 2);
    }

    #[test]
    fn test_record_transition_counts_edges() {
        let mut history = SqliteHistory::open_in_memory().unwrap();

        let count = history
            .record_transition("A", "First", "B", "Second")
            .unwrap();
        assert_eq!(count, 1);
        let count = history
            .record_transition("A", "First", "B", "Second")
            .unwrap();
        assert_eq!(count, 2);

        // Distinct edges count separately.
        let other = history
            .record_transition("B", "Second", "A", "First")
            .unwrap();
        assert_eq!(other, 1);
    }

    #[test]
    fn test_queue_roundtrip_preserves_order() {
        let mut history = SqliteHistory::open_in_memory().unwrap();

        let entries = vec![
            SavedTrack {
                artist: "A".into(),
                album: "X".into(),
                title: "one".into(),
            },
            SavedTrack {
                artist: "B".into(),
                album: "Y".into(),
                title: "two".into(),
            },
        ];
        history.save_queue("evening", &entries).unwrap();
        assert_eq!(history.load_queue("evening").unwrap(), entries);

        // Saving again replaces, not appends.
        history.save_queue("evening", &entries[..1]).unwrap();
        assert_eq!(history.load_queue("evening").unwrap().len(), 1);
    }

    #[test]
    fn test_load_unknown_queue_is_empty() {
        let mut history = SqliteHistory::open_in_memory().unwrap();
        assert!(history.load_queue("nope").unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = SqliteHistory::open(&dir.path().join("history.db")).unwrap();
        history
            .record_play("Artist", "Album", "Song", 48_000, 24)
            .unwrap();
    }
}
