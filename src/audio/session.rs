// The one live playback session and its transport state machine.
// Everything here is plain data - the controller wraps it in a lock and is the
// only thing that decides who may write it.

use super::source::TrackSource;
use super::staging::StagingArtifact;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportState {
    Empty,
    Loaded,
    Playing,
    Paused,
    Stopped,
}

/// Result of one position-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Tick {
    /// Not playing, nothing written
    Idle,
    Advanced(f64),
    /// Position hit the known duration, session is now stopped
    Finished(f64),
}

#[derive(Debug)]
pub struct PlaybackSession {
    source: Option<TrackSource>,
    display_name: String,
    state: TransportState,
    position: f64,
    duration: f64, // 0.0 = unknown
    volume: u8,
    // Position is `anchor.1 + (now - anchor.0)` while playing; same thing as
    // keeping a start epoch of `now - position`.
    anchor: Option<(Instant, f64)>,
    artifact: Option<StagingArtifact>,
    ended: bool,
    // Id of the position loop allowed to write; 0 = none
    ticker: u64,
}

impl PlaybackSession {
    pub fn empty(volume: u8) -> Self {
        Self {
            source: None,
            display_name: String::new(),
            state: TransportState::Empty,
            position: 0.0,
            duration: 0.0,
            volume: volume.min(100),
            anchor: None,
            artifact: None,
            ended: false,
            ticker: 0,
        }
    }

    pub(crate) fn install(
        &mut self,
        source: TrackSource,
        display_name: String,
        duration: f64,
        artifact: Option<StagingArtifact>,
    ) {
        self.source = Some(source);
        self.display_name = display_name;
        self.state = TransportState::Loaded;
        self.position = 0.0;
        self.duration = sanitize(duration);
        self.anchor = None;
        self.artifact = artifact;
        self.ended = false;
        self.ticker = 0;
    }

    /// Back to `Empty`, handing over the artifact so the caller can delete it
    /// outside the lock.
    pub(crate) fn clear(&mut self) -> Option<StagingArtifact> {
        let volume = self.volume;
        let artifact = self.artifact.take();
        *self = Self::empty(volume);
        artifact
    }

    /// Explicit stop: position back to 0, artifact handed over for deletion.
    pub(crate) fn stop(&mut self) -> Option<StagingArtifact> {
        if self.state != TransportState::Empty {
            self.state = TransportState::Stopped;
        }
        self.position = 0.0;
        self.anchor = None;
        self.ended = false;
        self.ticker = 0;
        self.artifact.take()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub(crate) fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    /// File the engine should read: the staged copy for remote tracks, the
    /// original path for local ones. `None` once a remote copy was released.
    pub fn playable_path(&self) -> Option<PathBuf> {
        match &self.source {
            Some(TrackSource::Local(path)) => Some(path.clone()),
            Some(TrackSource::Remote(_)) => self
                .artifact
                .as_ref()
                .and_then(|artifact| artifact.path())
                .map(|path| path.to_path_buf()),
            None => None,
        }
    }

    pub(crate) fn artifact_path(&self) -> Option<PathBuf> {
        self.artifact
            .as_ref()
            .and_then(|artifact| artifact.path())
            .map(|path| path.to_path_buf())
    }

    fn clamp(&self, position: f64) -> f64 {
        let position = sanitize(position);
        if self.duration > 0.0 {
            position.min(self.duration)
        } else {
            position
        }
    }

    fn estimate(&self, now: Instant) -> f64 {
        match self.anchor {
            Some((at, base)) => base + now.saturating_duration_since(at).as_secs_f64(),
            None => self.position,
        }
    }

    /// Enter `Playing` from the current position.
    pub(crate) fn begin_playing(&mut self, now: Instant) {
        if self.ended {
            self.position = 0.0;
            self.ended = false;
        }
        self.anchor = Some((now, self.position));
        self.state = TransportState::Playing;
    }

    /// Enter `Paused`, pinning the position.
    pub(crate) fn freeze(&mut self, now: Instant) {
        self.position = self.clamp(self.estimate(now));
        self.anchor = None;
        self.state = TransportState::Paused;
    }

    /// Where playback is right now, including time not yet picked up by a tick.
    pub(crate) fn position_at(&self, now: Instant) -> f64 {
        match self.state {
            TransportState::Playing => self.clamp(self.estimate(now).max(self.position)),
            _ => self.position,
        }
    }

    /// Output died underneath us: `Stopped` at the current position, no loop
    /// may write anymore. Unlike `stop`, the artifact stays for a later `play`.
    pub(crate) fn halt(&mut self, now: Instant) {
        if self.state == TransportState::Empty {
            return;
        }
        self.position = self.position_at(now);
        self.anchor = None;
        self.state = TransportState::Stopped;
        self.ticker = 0;
    }

    /// Jump to `target` keeping the current transport state.
    pub(crate) fn reposition(&mut self, target: f64, now: Instant) {
        self.position = self.clamp(target);
        self.ended = false;
        if self.state == TransportState::Playing {
            self.anchor = Some((now, self.position));
        }
    }

    pub(crate) fn grant_ticker(&mut self, id: u64) {
        self.ticker = id;
    }

    /// After this, loop `id` can no longer write.
    pub(crate) fn revoke_ticker(&mut self, id: u64) {
        if self.ticker == id {
            self.ticker = 0;
        }
    }

    pub(crate) fn ticker_allowed(&self, id: u64) -> bool {
        id != 0 && self.ticker == id
    }

    /// One position-loop iteration.
    pub(crate) fn tick(&mut self, now: Instant) -> Tick {
        if self.state != TransportState::Playing {
            return Tick::Idle;
        }

        let estimated = sanitize(self.estimate(now)).max(self.position);
        if self.duration > 0.0 && estimated >= self.duration {
            self.position = self.duration;
            self.anchor = None;
            self.state = TransportState::Stopped;
            self.ended = true;
            self.ticker = 0;
            return Tick::Finished(self.duration);
        }

        self.position = estimated;
        Tick::Advanced(estimated)
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            state: self.state,
            is_playing: self.state == TransportState::Playing,
            is_paused: self.state == TransportState::Paused,
            position_seconds: self.position,
            duration_seconds: self.duration,
            volume_percent: self.volume,
            display_name: self.display_name.clone(),
            source: self.source.clone(),
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Read-only snapshot handed to UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub state: TransportState,
    pub is_playing: bool,
    pub is_paused: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub volume_percent: u8,
    pub display_name: String,
    pub source: Option<TrackSource>,
}

impl PlaybackStatus {
    /// 0.0 to 1.0, `None` while the duration is unknown.
    pub fn progress(&self) -> Option<f64> {
        if self.duration_seconds > 0.0 {
            Some((self.position_seconds / self.duration_seconds).clamp(0.0, 1.0))
        } else {
            None
        }
    }
}
