//! Voice activity detection over the local microphone.

mod detector;
mod hysteresis;

pub use detector::{ActivityDetector, VadSettings};
pub use hysteresis::Hysteresis;
