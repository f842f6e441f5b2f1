// Test doubles for the controller: an engine that records what it was asked to
// do and fetchers with scripted behavior.

use super::clock::Clock;
use super::engine::AudioEngine;
use super::error::{PlayerError, PlayerResult};
use super::fetch::ByteFetcher;
use async_trait::async_trait;
use reqwest::Url;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Open(PathBuf),
    Probe(PathBuf),
    Play(Option<Duration>),
    Pause,
    Resume,
    Stop,
    SetVolume(f32),
    Release,
}

#[derive(Clone)]
pub struct ScriptedEngine {
    pub calls: Arc<Mutex<Vec<EngineCall>>>,
    pub fail_open: Arc<AtomicBool>,
    // How many upcoming `play` calls fail
    fail_play: Arc<AtomicUsize>,
    probe: Option<Duration>,
}

impl ScriptedEngine {
    /// `probe_secs = None` makes every probe fail.
    pub fn new(probe_secs: Option<f64>) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_open: Arc::new(AtomicBool::new(false)),
            fail_play: Arc::new(AtomicUsize::new(0)),
            probe: probe_secs.map(Duration::from_secs_f64),
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn fail_next_plays(&self, count: usize) {
        self.fail_play.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Open(path) => Some(path),
                _ => None,
            })
            .collect()
    }
}

impl AudioEngine for ScriptedEngine {
    fn open(&mut self, path: &Path) -> PlayerResult<()> {
        self.record(EngineCall::Open(path.to_path_buf()));
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(PlayerError::Decode(format!("{} is not audio", path.display())));
        }
        Ok(())
    }

    fn probe_duration(&mut self, path: &Path) -> PlayerResult<Duration> {
        self.record(EngineCall::Probe(path.to_path_buf()));
        self.probe
            .ok_or_else(|| PlayerError::ProbeFailed("scripted probe failure".to_string()))
    }

    fn play(&mut self, start: Option<Duration>) -> PlayerResult<()> {
        self.record(EngineCall::Play(start));
        let failing = self
            .fail_play
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PlayerError::Output("scripted output failure".to_string()));
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.record(EngineCall::Pause);
    }

    fn resume(&mut self) {
        self.record(EngineCall::Resume);
    }

    fn stop(&mut self) {
        self.record(EngineCall::Stop);
    }

    fn set_volume(&mut self, volume: f32) {
        self.record(EngineCall::SetVolume(volume));
    }

    fn release(&mut self) {
        self.record(EngineCall::Release);
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}

/// Serves the same bytes for every URL.
pub struct StaticFetcher {
    pub body: Vec<u8>,
}

#[async_trait]
impl ByteFetcher for StaticFetcher {
    async fn fetch(&self, _url: &Url, sink: &mut (dyn Write + Send)) -> PlayerResult<u64> {
        sink.write_all(&self.body)?;
        Ok(self.body.len() as u64)
    }
}

/// Writes a little, then hangs for `delay` before finishing.
pub struct SlowFetcher {
    pub delay: Duration,
}

#[async_trait]
impl ByteFetcher for SlowFetcher {
    async fn fetch(&self, _url: &Url, sink: &mut (dyn Write + Send)) -> PlayerResult<u64> {
        sink.write_all(b"partial")?;
        tokio::time::sleep(self.delay).await;
        Ok(7)
    }
}

pub struct FailingFetcher;

#[async_trait]
impl ByteFetcher for FailingFetcher {
    async fn fetch(&self, url: &Url, _sink: &mut (dyn Write + Send)) -> PlayerResult<u64> {
        Err(PlayerError::fetch_failed(url.as_str(), "connection refused"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance_secs(1.5);
        assert_eq!(clock.now() - t0, Duration::from_millis(1500));

        // Clones share the same timeline
        let other = clock.clone();
        other.advance(Duration::from_secs(2));
        assert_eq!(clock.now() - t0, Duration::from_millis(3500));
    }
}
