//! Identity-checked application of background resolutions.

use tracing::debug;

use crate::error::{ResolutionFailed, StaleWrite};
use crate::models::{EntryId, Playable, QueueItem, TrackInfo};
use crate::queue_store::QueueStore;
use crate::settings::SchedulerSettings;

/// Pending search at the queue head that should be resolved ahead of time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefetchTarget {
    pub expected: EntryId,
    pub query: String,
}

/// What happened to a finished manual prefetch.
#[derive(Debug, PartialEq, Eq)]
pub enum PrefetchOutcome {
    /// Head slot replaced with the resolved track.
    Applied(EntryId),
    /// The slot changed while resolving; result dropped.
    Discarded,
    /// Resolution failed; the entry stays a search and is retried when due.
    Failed,
}

/// Tracks manual prefetches for one channel and refuses stale results.
#[derive(Debug)]
pub struct PrefetchGuard {
    manual: bool,
    radio: bool,
    pending: Option<EntryId>,
    discarded: u64,
}

impl PrefetchGuard {
    pub fn new(settings: &SchedulerSettings) -> Self {
        Self {
            manual: settings.prefetch_manual,
            radio: settings.prefetch_radio,
            pending: None,
            discarded: 0,
        }
    }

    /// Whether radio picks may be generated while a track is still playing.
    pub fn radio_enabled(&self) -> bool {
        self.radio
    }

    /// Pick the head for prefetching when it is an unresolved search not already in flight.
    pub fn manual_target(&mut self, queue: &QueueStore) -> Option<PrefetchTarget> {
        if !self.manual {
            return None;
        }
        let head = queue.head()?;
        let QueueItem::Track {
            playable: Playable::Search { query },
            ..
        } = head.item()
        else {
            return None;
        };
        if self.pending == Some(head.id()) {
            return None;
        }
        self.pending = Some(head.id());
        Some(PrefetchTarget {
            expected: head.id(),
            query: query.clone(),
        })
    }

    /// Apply a finished resolution to slot 0 if it still holds `expected`.
    pub fn apply(
        &mut self,
        queue: &mut QueueStore,
        expected: EntryId,
        result: Result<TrackInfo, ResolutionFailed>,
    ) -> PrefetchOutcome {
        if self.pending == Some(expected) {
            self.pending = None;
        }
        let info = match result {
            Ok(info) => info,
            Err(err) => {
                debug!(error = %err, "prefetch resolution failed");
                return PrefetchOutcome::Failed;
            }
        };
        match replace_head(queue, expected, info) {
            Ok(id) => PrefetchOutcome::Applied(id),
            Err(stale) => {
                self.discarded += 1;
                debug!(index = stale.index, "discarding stale prefetch");
                PrefetchOutcome::Discarded
            }
        }
    }

    /// Forget any in-flight target, e.g. after the queue was cleared.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

fn replace_head(
    queue: &mut QueueStore,
    expected: EntryId,
    info: TrackInfo,
) -> Result<EntryId, StaleWrite> {
    let origin = match queue.head() {
        Some(head) if head.id() == expected => head.item().origin().cloned(),
        _ => None,
    };
    let Some(origin) = origin else {
        return Err(StaleWrite { index: 0 });
    };
    queue.replace_at(
        0,
        QueueItem::Track {
            playable: Playable::from(info),
            origin,
        },
        expected,
    )
}
