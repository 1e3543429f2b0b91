//! Ownership of the local capture sources.

use std::sync::Arc;

use huddle_common::DeviceError;
use tracing::{debug, info};

use super::types::{MediaDevices, MediaSource};

/// Holds at most one microphone and one screen source.
///
/// Releasing takes the source out of the gate before stopping it, so a
/// second release finds nothing and stops nothing.
pub struct MediaGate {
    devices: Arc<dyn MediaDevices>,
    microphone: Option<Arc<dyn MediaSource>>,
    screen: Option<Arc<dyn MediaSource>>,
}

impl MediaGate {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            microphone: None,
            screen: None,
        }
    }

    /// Open the microphone, or return the one already held.
    pub async fn acquire_microphone(&mut self) -> Result<Arc<dyn MediaSource>, DeviceError> {
        if let Some(mic) = &self.microphone {
            return Ok(Arc::clone(mic));
        }
        let mic = self.devices.open_microphone().await?;
        info!(source_id = mic.id(), "Microphone acquired");
        self.microphone = Some(Arc::clone(&mic));
        Ok(mic)
    }

    /// Prompt for a screen source, or return the one already held.
    pub async fn acquire_screen(&mut self) -> Result<Arc<dyn MediaSource>, DeviceError> {
        if let Some(screen) = &self.screen {
            return Ok(Arc::clone(screen));
        }
        let screen = self.devices.open_screen().await?;
        info!(source_id = screen.id(), "Screen capture acquired");
        self.screen = Some(Arc::clone(&screen));
        Ok(screen)
    }

    /// Toggle microphone transmission. No-op without a microphone.
    pub fn set_microphone_enabled(&self, enabled: bool) {
        if let Some(mic) = &self.microphone {
            if mic.is_enabled() != enabled {
                debug!(enabled, "Microphone track toggled");
                mic.set_enabled(enabled);
            }
        }
    }

    pub fn release_microphone(&mut self) -> Option<Arc<dyn MediaSource>> {
        let mic = self.microphone.take()?;
        mic.stop();
        info!(source_id = mic.id(), "Microphone released");
        Some(mic)
    }

    pub fn release_screen(&mut self) -> Option<Arc<dyn MediaSource>> {
        let screen = self.screen.take()?;
        screen.stop();
        info!(source_id = screen.id(), "Screen capture released");
        Some(screen)
    }

    pub fn release_all(&mut self) {
        self.release_screen();
        self.release_microphone();
    }

    pub fn microphone(&self) -> Option<&Arc<dyn MediaSource>> {
        self.microphone.as_ref()
    }

    pub fn screen(&self) -> Option<&Arc<dyn MediaSource>> {
        self.screen.as_ref()
    }

    /// Sources a new peer session should carry: the microphone always,
    /// the screen while a share is active.
    pub fn active_sources(&self) -> Vec<Arc<dyn MediaSource>> {
        self.microphone
            .iter()
            .chain(self.screen.iter())
            .map(Arc::clone)
            .collect()
    }
}
