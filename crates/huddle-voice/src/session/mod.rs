//! The voice-session engine facade.
//!
//! `SessionManager` owns the roster, the peer-session map, the media gate
//! and the activity detector. Every state change runs under one lock, so
//! envelope dispatch, timer callbacks and UI calls never interleave inside
//! a handler; they only interleave at the awaits a handler makes.

mod dispatch;
mod manager;
mod roster;
mod types;


pub use manager::SessionManager;
pub use roster::Roster;
pub use types::{EngineConfig, InputMode, LocalVoiceState, VoiceEvent};
