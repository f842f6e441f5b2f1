use super::AudioFormat;
use reqwest::Url;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the bytes of a track come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSource {
    Remote(Url),
    Local(PathBuf),
}

impl TrackSource {
    /// http(s) URLs are remote, everything else is treated as a filesystem path.
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => TrackSource::Remote(url),
            _ => TrackSource::Local(PathBuf::from(raw)),
        }
    }

    #[cfg(test)]
    pub fn is_remote(&self) -> bool {
        matches!(self, TrackSource::Remote(_))
    }

    pub fn format(&self) -> AudioFormat {
        let ext = match self {
            TrackSource::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .and_then(|last| Path::new(last).extension())
                .and_then(|ext| ext.to_str())
                .map(str::to_owned),
            TrackSource::Local(path) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_owned),
        };
        ext.map(|e| AudioFormat::from_extension(&e))
            .unwrap_or(AudioFormat::Unknown)
    }

    /// Human label used when the caller didn't supply one.
    /// "my_song.mp3" becomes "my song".
    pub fn derived_name(&self) -> String {
        let stem = match self {
            TrackSource::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|last| !last.is_empty())
                .and_then(|last| Path::new(last).file_stem())
                .and_then(|stem| stem.to_str())
                .map(str::to_owned),
            TrackSource::Local(path) => path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_owned),
        };
        stem.map(|s| s.replace('_', " "))
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::Remote(url) => write!(f, "{}", url),
            TrackSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Serialize for TrackSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
