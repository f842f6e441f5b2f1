pub mod clock;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod player;
pub mod session;
pub mod source;
pub mod staging;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, SystemClock};
pub use engine::AudioEngine;
#[cfg(feature = "audio")]
pub use engine::RodioEngine;
pub use error::{PlayerError, PlayerResult};
pub use fetch::{ByteFetcher, HttpConfig, HttpFetcher};
pub use player::{PlaybackController, PlayerEvent};
pub use session::{PlaybackStatus, TransportState};
pub use source::TrackSource;
pub use staging::{StagingArea, StagingArtifact, StagingConfig};

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub default_volume: u8, // 0 to 100
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub teardown_wait: Duration, // how long teardown waits for the position loop
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            default_volume: 70,
            poll_interval: Duration::from_millis(100),
            fetch_timeout: Duration::from_secs(30),
            teardown_wait: Duration::from_secs(1),
        }
    }
}

impl From<&crate::config::PlayerConfig> for AudioConfig {
    fn from(config: &crate::config::PlayerConfig) -> Self {
        Self {
            default_volume: config.default_volume.min(100),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            teardown_wait: Duration::from_millis(config.teardown_wait_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Ogg,
    Mp4,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "flac" => AudioFormat::Flac,
            "ogg" | "oga" => AudioFormat::Ogg,
            "mp4" | "m4a" | "aac" => AudioFormat::Mp4,
            "wav" => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }

    /// Extension given to staged downloads. Unknown streams are assumed mp3.
    pub fn staging_extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 | AudioFormat::Unknown => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp4 => "m4a",
            AudioFormat::Wav => "wav",
        }
    }
}

/// `m:ss`, the way the track labels show elapsed and total time.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
