//! Connected channels and their session tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use radio_types::ChannelId;
use tracing::info;

use crate::audio_backend::AudioBackend;
use crate::collaborators::Collaborators;
use crate::error::SchedulerError;
use crate::events::EventBus;
use crate::handle::ChannelHandle;
use crate::playback_engine::spawn_channel;
use crate::settings::SchedulerSettings;

/// Creates one session per channel on first connect and tears it down on disconnect.
pub struct ChannelRegistry {
    channels: Mutex<HashMap<ChannelId, ChannelHandle>>,
    collaborators: Collaborators,
    settings: Arc<SchedulerSettings>,
    events: EventBus,
}

impl ChannelRegistry {
    pub fn new(collaborators: Collaborators, settings: SchedulerSettings) -> Self {
        let events = EventBus::new(settings.event_capacity);
        Self {
            channels: Mutex::new(HashMap::new()),
            collaborators,
            settings: Arc::new(settings),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Return the channel's handle, starting a session with `backend` if none is running.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn connect(&self, channel: ChannelId, backend: Arc<dyn AudioBackend>) -> ChannelHandle {
        let mut channels = self.channels.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(handle) = channels.get(&channel) {
            return handle.clone();
        }
        info!(channel = %channel, "connecting channel");
        let handle = spawn_channel(
            channel.clone(),
            backend,
            self.collaborators.clone(),
            self.settings.clone(),
            self.events.clone(),
        );
        channels.insert(channel, handle.clone());
        handle
    }

    pub fn get(&self, channel: &ChannelId) -> Result<ChannelHandle, SchedulerError> {
        self.channels
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(channel)
            .cloned()
            .ok_or_else(|| SchedulerError::NotConnected(channel.clone()))
    }

    /// Tear down the channel's session and forget it.
    pub async fn disconnect(&self, channel: &ChannelId) -> Result<(), SchedulerError> {
        let handle = self
            .channels
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(channel)
            .ok_or_else(|| SchedulerError::NotConnected(channel.clone()))?;
        info!(channel = %channel, "disconnecting channel");
        match handle.disconnect().await {
            Ok(()) | Err(SchedulerError::ChannelClosed) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Connected channel ids, sorted.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self
            .channels
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Disconnect every channel.
    pub async fn shutdown(&self) {
        for channel in self.channels() {
            let _ = self.disconnect(&channel).await;
        }
    }
}
