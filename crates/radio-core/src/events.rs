//! In-process event bus for channel updates.
//!
//! Every channel task publishes here; front-ends subscribe for live updates.

use tokio::sync::broadcast;

use radio_types::{ChannelEvent, ChannelEventKind, ChannelId, NowPlaying};

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelEvent>,
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, channel: &ChannelId, kind: ChannelEventKind) {
        let _ = self.sender.send(ChannelEvent {
            channel_id: channel.clone(),
            kind,
        });
    }

    /// Notify subscribers that the queue has changed.
    pub fn queue_changed(&self, channel: &ChannelId) {
        self.publish(channel, ChannelEventKind::QueueChanged);
    }

    pub fn now_playing(&self, channel: &ChannelId, now_playing: &NowPlaying) {
        self.publish(channel, ChannelEventKind::NowPlaying(now_playing.clone()));
    }

    /// Side message for intro and text announcements.
    pub fn announcement(&self, channel: &ChannelId, text: &str) {
        self.publish(
            channel,
            ChannelEventKind::Announcement {
                text: text.to_string(),
            },
        );
    }

    pub fn idle(&self, channel: &ChannelId) {
        self.publish(channel, ChannelEventKind::Idle);
    }

    /// The single user-visible notice for a failed radio pick.
    pub fn radio_failed(&self, channel: &ChannelId, reason: &str) {
        self.publish(
            channel,
            ChannelEventKind::RadioFailed {
                reason: reason.to_string(),
            },
        );
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
