//! Configuration schema types for Huddle.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults documented in the template.

mod logging;
mod relay;
mod signaling;
mod voice;

pub use logging::*;
pub use relay::*;
pub use signaling::*;
pub use voice::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Huddle.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HuddleConfig {
    pub signaling: SignalingSection,
    pub voice: VoiceSection,
    pub relay: RelaySection,
    pub logging: LoggingSection,
}

// =============================================================================
// Tests
// =============================================================================
