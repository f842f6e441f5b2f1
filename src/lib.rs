// tapedeck - single-track playback controller
// Loads one track (URL or local file), drives the output engine and keeps
// an honest estimate of where playback is.

pub mod audio;   // controller, engine, fetching, staging
pub mod config;  // settings and defaults
pub mod logging; // tracing setup for binaries

// Export the stuff callers actually use
pub use audio::{
    format_clock, AudioConfig, PlaybackController, PlaybackStatus, PlayerError, PlayerEvent,
    TrackSource, TransportState,
};
pub use config::Config;
