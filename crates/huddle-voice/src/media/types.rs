//! Capture and playback seams.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_common::DeviceError;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// A live local capture source (microphone or screen).
pub trait MediaSource: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Enable or disable transmission without releasing the device.
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Release the device. Calling this more than once is a no-op.
    fn stop(&self);

    /// Flips to `true` when the source ends on its own, e.g. the user
    /// stopped a screen share from the OS picker.
    fn ended(&self) -> watch::Receiver<bool>;

    /// Open a level meter over this source, if it carries audio.
    fn level_meter(&self) -> Option<Box<dyn LevelMeter>>;
}

/// Spectral level reader over an audio source.
///
/// Dropping the meter releases whatever analysis resources it holds.
pub trait LevelMeter: Send {
    /// Mean normalized magnitude across frequency bins, in `[0, 1]`.
    fn sample(&mut self) -> f32;
}

/// A track received from a remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    /// Stream the track arrived in, when the transport reports one.
    pub stream_id: Option<String>,
}

/// Playback endpoint for one remote audio track.
pub trait AudioSink: Send {
    fn set_muted(&mut self, muted: bool);

    /// Stop playback and release the endpoint.
    fn detach(&mut self);
}

/// Access to capture devices and audio playback.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open the default microphone with echo cancellation and noise
    /// suppression enabled.
    async fn open_microphone(&self) -> Result<Arc<dyn MediaSource>, DeviceError>;

    /// Prompt for a screen or window to capture. Audio is not captured.
    async fn open_screen(&self) -> Result<Arc<dyn MediaSource>, DeviceError>;

    /// Create a playback sink for a remote audio track. Sinks start unmuted.
    fn attach_remote_audio(&self, user_id: &str, track: &RemoteTrack) -> Box<dyn AudioSink>;
}
