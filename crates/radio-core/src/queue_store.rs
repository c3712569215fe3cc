//! Per-channel queue storage.
//!
//! Owns queue mutations, radio purges and identity-checked replacement.

use std::collections::{HashSet, VecDeque};

use radio_types::{NextUp, QueueEntryView};

use crate::error::{EmptyQueue, StaleWrite};
use crate::models::{EntryId, PairId, QueueEntry, QueueItem};

/// Ordered queue of items for one channel.
#[derive(Debug, Default)]
pub struct QueueStore {
    entries: VecDeque<QueueEntry>,
    next_id: u64,
    next_pair: u64,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> EntryId {
        self.next_id += 1;
        EntryId(self.next_id)
    }

    /// Append an item to the tail.
    pub fn enqueue(&mut self, item: QueueItem) -> EntryId {
        let id = self.allocate_id();
        self.entries.push_back(QueueEntry {
            id,
            pair: None,
            item,
        });
        id
    }

    /// Append an announcement immediately followed by the radio candidate it introduces.
    ///
    /// Both halves share a pair tag so [`QueueStore::purge_radio_candidates`] removes them together.
    /// Returns the candidate id.
    pub fn enqueue_pair(&mut self, announcement: QueueItem, candidate: QueueItem) -> EntryId {
        debug_assert!(announcement.is_announcement());
        debug_assert!(candidate.is_radio_candidate());
        self.next_pair += 1;
        let pair = Some(PairId(self.next_pair));
        let announcement_id = self.allocate_id();
        self.entries.push_back(QueueEntry {
            id: announcement_id,
            pair,
            item: announcement,
        });
        let candidate_id = self.allocate_id();
        self.entries.push_back(QueueEntry {
            id: candidate_id,
            pair,
            item: candidate,
        });
        candidate_id
    }

    /// Remove every radio candidate and the announcements paired with them.
    ///
    /// User entries keep their relative order. Returns the removed entries.
    pub fn purge_radio_candidates(&mut self) -> Vec<QueueEntry> {
        let purged_pairs: HashSet<PairId> = self
            .entries
            .iter()
            .filter(|entry| entry.item.is_radio_candidate())
            .filter_map(|entry| entry.pair)
            .collect();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let paired = entry.pair.is_some_and(|pair| purged_pairs.contains(&pair));
            if entry.item.is_radio_candidate() || paired {
                removed.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        self.entries = kept;
        removed
    }

    /// Remove and return the head entry.
    pub fn pop_front(&mut self) -> Result<QueueEntry, EmptyQueue> {
        self.entries.pop_front().ok_or(EmptyQueue)
    }

    /// Describe the next piece of content, skipping announcements.
    pub fn peek_next_displayable(&self) -> Option<NextUp> {
        self.entries.iter().find_map(|entry| match &entry.item {
            QueueItem::Track { playable, origin } => Some(NextUp {
                title: playable.label().to_string(),
                origin: origin.clone(),
            }),
            QueueItem::Intro { .. } | QueueItem::Text { .. } => None,
        })
    }

    /// Replace the entry at `index` only if it still is `expected`.
    ///
    /// The replacement gets a fresh id and inherits the pair tag. On mismatch the
    /// queue is left untouched.
    pub fn replace_at(
        &mut self,
        index: usize,
        new_item: QueueItem,
        expected: EntryId,
    ) -> Result<EntryId, StaleWrite> {
        match self.entries.get(index) {
            Some(entry) if entry.id == expected => {}
            _ => return Err(StaleWrite { index }),
        }
        let id = self.allocate_id();
        let slot = &mut self.entries[index];
        slot.id = id;
        slot.item = new_item;
        Ok(id)
    }

    pub fn head(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    /// Drop everything. Returns the removed entries.
    pub fn clear(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Display rows for the whole queue.
    pub fn views(&self) -> Vec<QueueEntryView> {
        self.entries.iter().map(QueueEntry::view).collect()
    }
}
