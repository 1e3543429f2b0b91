//! Periodic level sampling that drives the local talking indicator.

use std::sync::Arc;
use std::time::Duration;

use huddle_config::schema::VadSection;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::media::MediaSource;

use super::hysteresis::Hysteresis;

/// Runtime VAD parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadSettings {
    pub interval: Duration,
    /// Mean normalized magnitude above which a sample counts as loud.
    pub threshold: f32,
    pub release_samples: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self::from(&VadSection::default())
    }
}

impl From<&VadSection> for VadSettings {
    fn from(section: &VadSection) -> Self {
        Self {
            interval: Duration::from_millis(section.interval_ms.max(1)),
            threshold: section.threshold as f32,
            release_samples: section.release_samples,
        }
    }
}

/// Samples a source's level on a fixed interval and reports talking
/// transitions through a callback.
///
/// Stopping (or dropping) the detector ends the sampling task, which drops
/// the level meter and with it the analysis resources.
pub struct ActivityDetector {
    settings: VadSettings,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ActivityDetector {
    pub fn new(settings: VadSettings) -> Self {
        Self {
            settings,
            running: None,
        }
    }

    /// Start sampling `source`, replacing any previous run.
    ///
    /// Returns `false` when the source carries no audio to meter.
    pub fn start<F>(&mut self, source: &Arc<dyn MediaSource>, on_change: F) -> bool
    where
        F: Fn(bool) + Send + 'static,
    {
        self.stop();

        let Some(mut meter) = source.level_meter() else {
            warn!(source_id = source.id(), "Source has no level meter; VAD disabled");
            return false;
        };

        let settings = self.settings;
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut hysteresis = Hysteresis::new(settings.release_samples);
            let mut interval = tokio::time::interval(settings.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        let loud = meter.sample() > settings.threshold;
                        if let Some(talking) = hysteresis.push(loud) {
                            on_change(talking);
                        }
                    }
                }
            }
        });

        debug!(source_id = source.id(), interval_ms = settings.interval.as_millis() as u64, "VAD started");
        self.running = Some((token, handle));
        true
    }

    /// Stop sampling. Safe to call when not running.
    pub fn stop(&mut self) {
        if let Some((token, handle)) = self.running.take() {
            token.cancel();
            handle.abort();
            debug!("VAD stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for ActivityDetector {
    fn drop(&mut self) {
        self.stop();
    }
}
