//! Cloneable front door to one channel task.

use radio_types::{AnnouncerMode, ChannelId, NextUp, RadioMode, SessionSnapshot};
use tokio::sync::{mpsc, oneshot};

use crate::error::{SchedulerError, SearchError};
use crate::models::QueueItem;
use crate::playback_engine::ChannelCommand;

#[derive(Clone)]
pub struct ChannelHandle {
    channel: ChannelId,
    tx: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelHandle {
    pub(crate) fn new(channel: ChannelId, tx: mpsc::UnboundedSender<ChannelCommand>) -> Self {
        Self { channel, tx }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    #[cfg(test)]
    pub(crate) fn sender(&self) -> &mpsc::UnboundedSender<ChannelCommand> {
        &self.tx
    }

    fn send(&self, command: ChannelCommand) -> Result<(), SchedulerError> {
        self.tx
            .send(command)
            .map_err(|_| SchedulerError::ChannelClosed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ChannelCommand,
    ) -> Result<T, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        rx.await.map_err(|_| SchedulerError::ChannelClosed)
    }

    /// Append to the tail. Starts playback when the channel is idle.
    pub fn enqueue(&self, item: QueueItem) -> Result<(), SchedulerError> {
        self.send(ChannelCommand::Enqueue(item))
    }

    /// Explicit user play: drops queued radio picks, then enqueues.
    pub fn play(&self, item: QueueItem) -> Result<(), SchedulerError> {
        self.send(ChannelCommand::Play(item))
    }

    /// Expand a playlist and queue its entries. Returns how many were queued.
    pub async fn enqueue_playlist(
        &self,
        url: impl Into<String>,
        requester: impl Into<String>,
    ) -> Result<Result<usize, SearchError>, SchedulerError> {
        let url = url.into();
        let requester = requester.into();
        self.request(|reply| ChannelCommand::EnqueuePlaylist {
            url,
            requester,
            reply,
        })
        .await
    }

    pub fn skip(&self) -> Result<(), SchedulerError> {
        self.send(ChannelCommand::Skip)
    }

    /// Clear the queue, stop audio and switch the radio off.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        self.send(ChannelCommand::Stop)
    }

    pub fn pause_toggle(&self) -> Result<(), SchedulerError> {
        self.send(ChannelCommand::PauseToggle)
    }

    pub fn set_radio_mode(&self, mode: RadioMode) -> Result<(), SchedulerError> {
        self.send(ChannelCommand::SetRadioMode(mode))
    }

    pub fn set_announcer_mode(&self, mode: AnnouncerMode) -> Result<(), SchedulerError> {
        self.send(ChannelCommand::SetAnnouncerMode(mode))
    }

    /// What plays next, skipping announcements.
    pub async fn peek_next(&self) -> Result<Option<NextUp>, SchedulerError> {
        self.request(ChannelCommand::PeekNext).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SchedulerError> {
        self.request(ChannelCommand::Snapshot).await
    }

    /// Tear the session down and wait for the channel task to finish.
    pub async fn disconnect(&self) -> Result<(), SchedulerError> {
        self.request(ChannelCommand::Shutdown).await
    }
}
