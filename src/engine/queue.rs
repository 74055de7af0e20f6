//! Ordered queue storage with an optional shuffle-permutation overlay.
//!
//! The entry list holds the user-visible order; while a permutation
//! over `[0, len)` is installed it supplies the visiting order
//! instead. The permutation is owned here but computed by
//! [`super::shuffle`]; the engine owns the shuffle mode itself and
//! installs the permutation once entries exist.

use crate::model::QueueEntry;

/// The play queue: entries plus the optional permutation overlay.
#[derive(Debug, Clone, Default)]
pub struct QueueStore {
    entries: Vec<QueueEntry>,
    /// Visiting order while shuffle is active; empty otherwise.
    /// Invariant: when non-empty it is a bijection over `[0, len)`.
    permutation: Vec<usize>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        self.entries.get(index)
    }

    /// Whether a shuffle permutation is currently overlaid.
    pub fn shuffled(&self) -> bool {
        !self.permutation.is_empty()
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Install a permutation. Must be a bijection over `[0, len)`.
    pub fn set_permutation(&mut self, permutation: Vec<usize>) {
        debug_assert!({
            let mut check = permutation.clone();
            check.sort_unstable();
            check == (0..self.entries.len()).collect::<Vec<_>>()
        });
        self.permutation = permutation;
    }

    pub fn clear_permutation(&mut self) {
        self.permutation.clear();
    }

    /// Add entries at the end. Never touches the permutation; callers
    /// extend it separately so the already-played prefix survives.
    pub fn append(&mut self, entries: impl IntoIterator<Item = QueueEntry>) {
        self.entries.extend(entries);
    }

    /// Stepwise adjacent-swap reorder of a single entry from `from` to
    /// `to`. Rejected (returns false) while shuffle is active or when
    /// either index is out of range.
    pub fn move_range(&mut self, from: usize, to: usize) -> bool {
        if self.shuffled() {
            return false;
        }
        if from >= self.entries.len() || to >= self.entries.len() || from == to {
            return false;
        }

        let mut i = from;
        while i < to {
            self.entries.swap(i, i + 1);
            i += 1;
        }
        while i > to {
            self.entries.swap(i, i - 1);
            i -= 1;
        }
        true
    }

    /// Remove the entry at `index`. Only meaningful while shuffle is
    /// inactive; the engine rejects dequeue under shuffle before
    /// getting here.
    pub fn remove_at(&mut self, index: usize) -> Option<QueueEntry> {
        debug_assert!(self.permutation.is_empty());
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Drop entries and permutation together.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.permutation.clear();
    }

    /// Queue indices in visiting order: list order when shuffle is
    /// inactive, the permutation-mapped order otherwise.
    pub fn logical_order(&self) -> Vec<usize> {
        if self.shuffled() {
            self.permutation.clone()
        } else {
            (0..self.entries.len()).collect()
        }
    }

    /// Logical (visiting-order) position of a queue index.
    pub fn position_of(&self, index: usize) -> Option<usize> {
        if index >= self.entries.len() {
            return None;
        }
        if self.shuffled() {
            self.permutation.iter().position(|&i| i == index)
        } else {
            Some(index)
        }
    }

    /// Queue index at a logical (visiting-order) position.
    pub fn index_at(&self, logical_pos: usize) -> Option<usize> {
        if self.shuffled() {
            self.permutation.get(logical_pos).copied()
        } else if logical_pos < self.entries.len() {
            Some(logical_pos)
        } else {
            None
        }
    }

    /// Resolve a backend-reported source identity to a queue index by
    /// content match.
    pub fn index_of_source(&self, source: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.source == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Track;

    fn make_entry(name: &str) -> QueueEntry {
        QueueEntry {
            artist: "Artist".into(),
            album: "Album".into(),
            track: Track {
                title: name.to_string(),
                ..Track::default()
            },
            source: format!("/music/{name}.flac"),
        }
    }

    fn filled(n: usize) -> QueueStore {
        let mut store = QueueStore::new();
        store.append((0..n).map(|i| make_entry(&format!("t{i}"))));
        store
    }

    #[test]
    fn test_append_and_order() {
        let store = filled(3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.logical_order(), vec![0, 1, 2]);
    }

    #[test]
    fn test_append_never_touches_permutation() {
        let mut store = filled(3);
        store.set_permutation(vec![2, 0, 1]);
        store.append([make_entry("t3")]);
        assert_eq!(store.permutation(), &[2, 0, 1]);
    }

    #[test]
    fn test_move_range_forward_and_back() {
        let mut store = filled(4);
        assert!(store.move_range(0, 2));
        let titles: Vec<_> = store.entries().iter().map(|e| e.track.title.clone()).collect();
        assert_eq!(titles, vec!["t1", "t2", "t0", "t3"]);

        assert!(store.move_range(2, 0));
        let titles: Vec<_> = store.entries().iter().map(|e| e.track.title.clone()).collect();
        assert_eq!(titles, vec!["t0", "t1", "t2", "t3"]);
    }

    #[test]
    fn test_move_range_rejected_under_shuffle() {
        let mut store = filled(3);
        store.set_permutation(vec![1, 2, 0]);
        assert!(!store.move_range(0, 2));
        assert_eq!(store.entries()[0].track.title, "t0");
    }

    #[test]
    fn test_move_range_out_of_range() {
        let mut store = filled(2);
        assert!(!store.move_range(0, 5));
        assert!(!store.move_range(5, 0));
        assert!(!store.move_range(1, 1));
    }

    #[test]
    fn test_remove_at() {
        let mut store = filled(3);
        let removed = store.remove_at(1).unwrap();
        assert_eq!(removed.track.title, "t1");
        assert_eq!(store.len(), 2);
        assert!(store.remove_at(7).is_none());
    }

    #[test]
    fn test_clear_drops_both() {
        let mut store = filled(3);
        store.set_permutation(vec![2, 1, 0]);
        store.clear();
        assert!(store.is_empty());
        assert!(!store.shuffled());
    }

    #[test]
    fn test_logical_order_follows_permutation() {
        let mut store = filled(3);
        store.set_permutation(vec![2, 0, 1]);
        assert_eq!(store.logical_order(), vec![2, 0, 1]);
        assert_eq!(store.position_of(0), Some(1));
        assert_eq!(store.index_at(0), Some(2));
    }

    #[test]
    fn test_index_of_source() {
        let store = filled(3);
        assert_eq!(store.index_of_source("/music/t2.flac"), Some(2));
        assert_eq!(store.index_of_source("/music/nope.flac"), None);
    }
}
