//! Ordered track list with a persisted mirror
//!
//! The store keeps `entries` and the serialized `mirror` side by side. Every
//! mutating call validates first and then updates both vectors in the same
//! step, so their lengths never differ, not even between two calls of a
//! batched edit.

use crate::error::{QueueError, Result};
use crate::model::{BUFFER_PLAYLIST, TrackEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistStore {
    name: String,
    entries: Vec<TrackEntry>,
    mirror: Vec<String>,
}

impl PlaylistStore {
    /// Empty store for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            mirror: Vec::new(),
        }
    }

    /// Empty scratch store used while no stored playlist is open.
    pub fn buffer() -> Self {
        Self::new(BUFFER_PLAYLIST)
    }

    /// Store rebuilt from persisted `Source|note` strings.
    pub fn hydrate(name: impl Into<String>, persisted: &[String]) -> Self {
        let mut store = Self::new(name);
        let entries: Vec<TrackEntry> = persisted
            .iter()
            .map(|raw| TrackEntry::from_persisted(raw))
            .collect();
        store.insert(0, entries);
        store
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_buffer(&self) -> bool {
        self.name == BUFFER_PLAYLIST
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrackEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[TrackEntry] {
        &self.entries
    }

    pub fn mirror(&self) -> &[String] {
        &self.mirror
    }

    /// Inserts `items` starting at `at`, clamped to `len`. Returns the index
    /// the first item landed at.
    pub fn insert(&mut self, at: usize, items: Vec<TrackEntry>) -> usize {
        let at = at.min(self.entries.len());
        for (offset, item) in items.into_iter().enumerate() {
            self.mirror.insert(at + offset, item.persisted());
            self.entries.insert(at + offset, item);
        }
        at
    }

    pub fn append(&mut self, items: Vec<TrackEntry>) -> usize {
        self.insert(self.entries.len(), items)
    }

    /// Removes `count` entries starting at `at`, highest index first.
    pub fn remove(&mut self, at: usize, count: usize) -> Result<Vec<TrackEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let len = self.entries.len();
        let end = at
            .checked_add(count)
            .filter(|end| *end <= len)
            .ok_or(QueueError::IndexOutOfRange {
                index: at.saturating_add(count).saturating_sub(1),
                len,
            })?;

        let mut removed = Vec::with_capacity(count);
        for index in (at..end).rev() {
            self.mirror.remove(index);
            removed.push(self.entries.remove(index));
        }
        removed.reverse();
        Ok(removed)
    }

    /// Removes arbitrary rows. Duplicates are ignored; any out-of-range row
    /// rejects the whole call.
    pub fn remove_rows(&mut self, rows: &[usize]) -> Result<Vec<TrackEntry>> {
        let mut sorted = rows.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if let Some(&bad) = sorted.iter().find(|row| **row >= self.entries.len()) {
            return Err(QueueError::IndexOutOfRange {
                index: bad,
                len: self.entries.len(),
            });
        }

        let mut removed = Vec::with_capacity(sorted.len());
        for row in sorted.into_iter().rev() {
            self.mirror.remove(row);
            removed.push(self.entries.remove(row));
        }
        removed.reverse();
        Ok(removed)
    }

    /// Replaces the note of one row, keeping the mirror in step.
    pub fn set_note(&mut self, index: usize, note: impl Into<String>) -> Result<()> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(QueueError::IndexOutOfRange { index, len })?;
        entry.note = note.into();
        self.mirror[index] = entry.persisted();
        Ok(())
    }

    /// Index of the last entry equal to `entry`.
    pub fn rposition(&self, entry: &TrackEntry) -> Option<usize> {
        self.entries.iter().rposition(|candidate| candidate == entry)
    }

    pub fn clear(&mut self) {
        for index in (0..self.entries.len()).rev() {
            self.mirror.remove(index);
            self.entries.remove(index);
        }
    }
}
