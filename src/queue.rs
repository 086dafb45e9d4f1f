//! Per-player track queue.
//!
//! The pending tracks live in an ordered sequence; the playing and
//! last-played tracks sit in the dedicated `current` / `previous` slots and
//! never count towards the pending length.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::error::{Error, Result};
use crate::track::QueueItem;

#[derive(Debug, Default)]
pub struct Queue {
    items: VecDeque<QueueItem>,
    /// The track playing right now, if any.
    pub current: Option<QueueItem>,
    /// The track that played before the current one.
    pub previous: Option<QueueItem>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending tracks, excluding `current`.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pending tracks plus the current one.
    pub fn total_size(&self) -> usize {
        self.items.len() + usize::from(self.current.is_some())
    }

    /// Summed duration in milliseconds of the current and pending tracks.
    /// Unresolved tracks without a declared duration count as zero.
    pub fn duration(&self) -> u64 {
        let current = self.current.as_ref().and_then(QueueItem::duration);
        self.items
            .iter()
            .filter_map(QueueItem::duration)
            .chain(current)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&QueueItem> {
        self.items.get(index)
    }

    /// Append a track to the tail.
    pub fn add(&mut self, item: impl Into<QueueItem>) {
        self.items.push_back(item.into());
    }

    /// Append several tracks to the tail, in order.
    pub fn add_many(&mut self, items: impl IntoIterator<Item = QueueItem>) {
        self.items.extend(items);
    }

    /// Insert a track at `offset` within the pending sequence.
    pub fn insert(&mut self, offset: usize, item: impl Into<QueueItem>) -> Result<()> {
        if offset > self.items.len() {
            return Err(Error::Validation(format!(
                "'offset' must be at most the queue length ({})",
                self.items.len()
            )));
        }
        self.items.insert(offset, item.into());
        Ok(())
    }

    /// Remove pending tracks in `[start, end)` (or just `start` when `end` is
    /// omitted), returning them. Never touches `current`.
    pub fn remove(&mut self, start: usize, end: Option<usize>) -> Result<Vec<QueueItem>> {
        let len = self.items.len();
        if start >= len {
            return Err(Error::Validation(format!(
                "'start' must be less than the queue length ({len})"
            )));
        }
        let end = end.unwrap_or(start + 1);
        if end <= start {
            return Err(Error::Validation(
                "'end' must be greater than 'start'".into(),
            ));
        }
        let end = end.min(len);
        Ok(self.items.drain(start..end).collect())
    }

    /// Drop every pending track. `current` and `previous` are untouched.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Unbiased shuffle of the pending tracks only.
    pub fn shuffle(&mut self) {
        self.items.make_contiguous().shuffle(&mut thread_rng());
    }

    /// Advance: the old current becomes `previous` and the head of the
    /// pending sequence becomes `current`. Returns the new current track.
    pub fn progress(&mut self) -> Option<&QueueItem> {
        self.previous = self.current.take();
        self.current = self.items.pop_front();
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::UnresolvedTrack;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> QueueItem {
        UnresolvedTrack::new(title).unwrap().duration(1000).into()
    }

    fn filled(titles: &[&str]) -> Queue {
        let mut queue = Queue::new();
        for title in titles {
            queue.add(track(title));
        }
        queue
    }

    #[test]
    fn progress_walks_to_the_last_element() {
        let mut queue = filled(&["a", "b", "c"]);
        let n = queue.len();
        for _ in 0..n {
            assert!(queue.progress().is_some());
        }
        assert!(queue.is_empty());
        assert_eq!(queue.current.as_ref().map(|t| t.title()), Some("c"));
        assert_eq!(queue.previous.as_ref().map(|t| t.title()), Some("b"));
        assert!(queue.progress().is_none());
    }

    #[test]
    fn current_is_excluded_from_length_but_not_totals() {
        let mut queue = filled(&["a", "b"]);
        queue.progress();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.total_size(), 2);
        assert_eq!(queue.duration(), 2000);
    }

    #[test]
    fn insert_respects_bounds() {
        let mut queue = filled(&["a", "c"]);
        queue.insert(1, track("b")).unwrap();
        let titles: Vec<_> = queue.iter().map(|t| t.title().to_owned()).collect();
        assert_eq!(titles, ["a", "b", "c"]);
        assert!(queue.insert(9, track("x")).is_err());
    }

    #[test]
    fn remove_range_and_bounds() {
        let mut queue = filled(&["a", "b", "c", "d"]);
        let removed = queue.remove(1, Some(3)).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].title(), "b");
        let titles: Vec<_> = queue.iter().map(|t| t.title().to_owned()).collect();
        assert_eq!(titles, ["a", "d"]);

        assert!(queue.remove(5, None).is_err());
        assert!(queue.remove(1, Some(1)).is_err());

        let removed = queue.remove(0, None).unwrap();
        assert_eq!(removed[0].title(), "a");
    }

    #[test]
    fn shuffle_keeps_current_in_place() {
        let mut queue = filled(&["a", "b", "c", "d", "e"]);
        queue.progress();
        for _ in 0..16 {
            queue.shuffle();
            assert_eq!(queue.current.as_ref().map(|t| t.title()), Some("a"));
            assert_eq!(queue.len(), 4);
        }
    }

    #[test]
    fn clear_leaves_slots_alone() {
        let mut queue = filled(&["a", "b"]);
        queue.progress();
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.current.is_some());
    }
}
