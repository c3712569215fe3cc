//! Scheduler tuning knobs.

use radio_types::AnnouncerMode;
use serde::{Deserialize, Serialize};

/// Settings shared by every channel session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Titles treated as "recent" when asking for a radio pick.
    pub recent_history: usize,
    /// Additional older titles used only as a do-not-repeat list.
    pub older_history: usize,
    /// Resolve a pending search at the queue head while the current track plays.
    pub prefetch_manual: bool,
    /// Generate the next radio pick while the last queued track plays.
    pub prefetch_radio: bool,
    /// Announcer mode for newly connected channels.
    pub default_announcer: AnnouncerMode,
    /// Event bus buffer size.
    pub event_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            recent_history: 5,
            older_history: 20,
            prefetch_manual: true,
            prefetch_radio: true,
            default_announcer: AnnouncerMode::Full,
            event_capacity: 64,
        }
    }
}

impl SchedulerSettings {
    /// Total history window fetched per radio pick.
    pub fn history_window(&self) -> usize {
        self.recent_history + self.older_history
    }
}
