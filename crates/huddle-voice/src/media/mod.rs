//! Local capture devices and the gate that owns them.
//!
//! The engine never talks to an audio/video stack directly. Capture and
//! playback come in through `MediaDevices`; `MediaGate` keeps at most one
//! microphone and one screen source alive and releases them exactly once.

mod gate;
mod types;

pub use gate::MediaGate;
pub use types::{AudioSink, LevelMeter, MediaDevices, MediaSource, RemoteTrack, TrackKind};
