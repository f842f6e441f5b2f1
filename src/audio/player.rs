use super::clock::{Clock, SystemClock};
use super::engine::AudioEngine;
use super::error::{PlayerError, PlayerResult};
use super::fetch::ByteFetcher;
use super::session::{PlaybackSession, PlaybackStatus, Tick, TransportState};
use super::source::TrackSource;
use super::staging::{StagingArea, StagingArtifact};
use super::AudioConfig;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackLoaded { name: String, duration: f64 },
    TrackStarted,
    TrackPaused(f64),
    TrackResumed(f64),
    TrackStopped,
    TrackFinished(f64),
    PositionChanged(f64),
    Seeked(f64),
    VolumeChanged(u8),
    Error(String),
}

type EventSender = mpsc::UnboundedSender<PlayerEvent>;

// A panicking position loop must not take the controller down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to the background position loop of one `play()` call.
struct Ticker {
    id: u64,
    cancel: std_mpsc::Sender<()>,
    done: std_mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

impl Ticker {
    /// Wake the loop and wait up to `wait` for it to exit. Past that it is
    /// detached; its write access was already revoked.
    fn shutdown(self, wait: Duration) {
        let Ticker {
            id,
            cancel,
            done,
            thread,
        } = self;
        drop(cancel);

        match done.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    warn!("Position loop {} panicked", id);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Position loop {} still running after {:?}, detaching", id, wait);
            }
        }
    }
}

fn run_position_loop(
    id: u64,
    session: Arc<Mutex<PlaybackSession>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancel: std_mpsc::Receiver<()>,
    done: std_mpsc::Sender<()>,
    events: Option<EventSender>,
) {
    debug!("Position loop {} started", id);

    loop {
        match cancel.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let tick = {
            let mut session = lock(&session);
            if !session.ticker_allowed(id) {
                break;
            }
            session.tick(clock.now())
        };

        match tick {
            Tick::Idle => {}
            Tick::Advanced(position) => {
                if let Some(sender) = &events {
                    let _ = sender.send(PlayerEvent::PositionChanged(position));
                }
            }
            Tick::Finished(duration) => {
                info!("Track finished at {:.1}s", duration);
                if let Some(sender) = &events {
                    let _ = sender.send(PlayerEvent::TrackFinished(duration));
                }
                break;
            }
        }
    }

    debug!("Position loop {} exited", id);
    let _ = done.send(());
}

/// The parts of the controller a load needs once its bytes are staged.
/// Runs on the blocking pool.
struct Installer {
    engine: Arc<Mutex<Box<dyn AudioEngine>>>,
    session: Arc<Mutex<PlaybackSession>>,
    loads: Arc<AtomicU64>,
    torn_down: Arc<AtomicBool>,
}

impl Installer {
    /// Open and probe the track, then make it the live session. Returns the
    /// probed duration (0.0 when unknown).
    fn install(
        self,
        generation: u64,
        source: TrackSource,
        name: String,
        artifact: Option<StagingArtifact>,
    ) -> PlayerResult<f64> {
        let mut engine = lock(&self.engine);

        // A newer load (or teardown) started while we were fetching
        if self.loads.load(Ordering::SeqCst) != generation || self.torn_down.load(Ordering::SeqCst) {
            return Err(PlayerError::Superseded);
        }

        let path = match &source {
            TrackSource::Local(path) => path.clone(),
            TrackSource::Remote(_) => artifact
                .as_ref()
                .and_then(|artifact| artifact.path())
                .map(Path::to_path_buf)
                .ok_or(PlayerError::NothingLoaded)?,
        };

        engine.stop();
        engine.open(&path)?;

        let duration = match engine.probe_duration(&path) {
            Ok(duration) => duration.as_secs_f64(),
            Err(e) => {
                warn!("{} - treating duration as unknown", e);
                0.0
            }
        };

        let mut session = lock(&self.session);
        engine.set_volume(f32::from(session.volume()) / 100.0);
        session.install(source, name, duration, artifact);
        Ok(session.duration())
    }
}

/// Owns the single live playback session.
///
/// Lock order is engine, then ticker slot, then session. The position loop
/// only ever takes the session lock.
pub struct PlaybackController {
    config: AudioConfig,
    engine: Arc<Mutex<Box<dyn AudioEngine>>>,
    session: Arc<Mutex<PlaybackSession>>,
    ticker: Mutex<Option<Ticker>>,
    fetcher: Arc<dyn ByteFetcher>,
    staging: StagingArea,
    clock: Arc<dyn Clock>,
    loads: Arc<AtomicU64>,
    tickers: AtomicU64,
    torn_down: Arc<AtomicBool>,
    event_sender: Option<EventSender>,
}

impl PlaybackController {
    pub fn new(config: AudioConfig, engine: Box<dyn AudioEngine>, fetcher: Arc<dyn ByteFetcher>) -> Self {
        let session = PlaybackSession::empty(config.default_volume);
        Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            session: Arc::new(Mutex::new(session)),
            ticker: Mutex::new(None),
            fetcher,
            staging: StagingArea::default(),
            clock: Arc::new(SystemClock),
            loads: Arc::new(AtomicU64::new(0)),
            tickers: AtomicU64::new(0),
            torn_down: Arc::new(AtomicBool::new(false)),
            event_sender: None,
        }
    }

    /// Real stack: default output device, HTTP fetching, staging as configured.
    #[cfg(feature = "audio")]
    pub fn from_config(config: &crate::config::Config) -> PlayerResult<Self> {
        let http = super::fetch::HttpConfig::from(&config.http);
        let fetcher = super::fetch::HttpFetcher::new(&http)?;
        let engine = super::engine::RodioEngine::new()?;
        let staging = StagingArea::new(super::staging::StagingConfig::from(&config.staging));

        Ok(Self::new(AudioConfig::from(&config.player), Box::new(engine), Arc::new(fetcher))
            .with_staging(staging))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_staging(mut self, staging: StagingArea) -> Self {
        self.staging = staging;
        self
    }

    pub fn set_event_sender(&mut self, sender: EventSender) {
        self.event_sender = Some(sender);
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }

    /// Load a URL or a local path. See [`load_source`](Self::load_source).
    pub async fn load(&self, source: &str, display_name: &str) -> PlayerResult<()> {
        self.load_source(TrackSource::parse(source), display_name).await
    }

    /// Tear down the current session, then fetch (for remote sources), open
    /// and probe the new track. On any failure the controller is left `Empty`.
    pub async fn load_source(&self, source: TrackSource, display_name: &str) -> PlayerResult<()> {
        let result = self.load_inner(source, display_name).await;
        if let Err(e) = &result {
            match e {
                // A newer load won; not something to report
                PlayerError::Superseded => debug!("Load abandoned: {}", e),
                _ => {
                    warn!("Failed to load track: {}", e);
                    self.emit(PlayerEvent::Error(e.to_string()));
                }
            }
        }
        result
    }

    async fn load_inner(&self, source: TrackSource, display_name: &str) -> PlayerResult<()> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(PlayerError::TornDown);
        }

        let generation = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Loading {} (load #{})", source, generation);

        // At most one session: the old one is gone before we fetch anything
        self.discard_session().await;

        let name = match display_name.trim() {
            "" => source.derived_name(),
            name => name.to_string(),
        };

        let artifact = self.stage(&source).await?;

        // Decoding and probing touch the disk, keep them off the executor
        let installer = Installer {
            engine: Arc::clone(&self.engine),
            session: Arc::clone(&self.session),
            loads: Arc::clone(&self.loads),
            torn_down: Arc::clone(&self.torn_down),
        };
        let label = name.clone();
        let duration = tokio::task::spawn_blocking(move || installer.install(generation, source, label, artifact))
            .await
            .map_err(|e| PlayerError::Output(format!("load task failed: {}", e)))??;

        info!("Loaded '{}' ({:.1}s)", name, duration);
        self.emit(PlayerEvent::TrackLoaded { name, duration });
        Ok(())
    }

    async fn stage(&self, source: &TrackSource) -> PlayerResult<Option<StagingArtifact>> {
        match source {
            TrackSource::Local(path) => {
                if !path.exists() {
                    return Err(PlayerError::FileNotFound(path.clone()));
                }
                Ok(None)
            }
            TrackSource::Remote(url) => {
                let mut writer = self.staging.create(&source.format())?;
                let timeout = self.config.fetch_timeout;

                match tokio::time::timeout(timeout, self.fetcher.fetch(url, &mut writer)).await {
                    Err(_) => Err(PlayerError::FetchTimeout(timeout)),
                    Ok(Err(e)) => Err(e),
                    Ok(Ok(bytes)) => {
                        debug!("Staged {} bytes at {}", bytes, writer.path().display());
                        Ok(Some(writer.finish()?))
                    }
                }
            }
        }
    }

    /// Stop output, cancel the loop and drop the session entirely.
    async fn discard_session(&self) {
        let (ticker, artifact) = {
            let mut engine = lock(&self.engine);
            engine.stop();
            let ticker = self.revoke_ticker();
            let artifact = lock(&self.session).clear();
            (ticker, artifact)
        };

        if let Some(ticker) = ticker {
            let wait = self.config.teardown_wait;
            if let Err(e) = tokio::task::spawn_blocking(move || ticker.shutdown(wait)).await {
                warn!("Joining the position loop failed: {}", e);
            }
        }
        if let Some(mut artifact) = artifact {
            artifact.release();
        }
    }

    /// Take the loop out of its slot and revoke its write access under the
    /// session lock. It can't touch the session after this returns.
    fn revoke_ticker(&self) -> Option<Ticker> {
        let ticker = lock(&self.ticker).take()?;
        lock(&self.session).revoke_ticker(ticker.id);
        Some(ticker)
    }

    /// Revoke, then wake and join the loop with a bounded wait.
    fn cancel_ticker(&self) {
        if let Some(ticker) = self.revoke_ticker() {
            ticker.shutdown(self.config.teardown_wait);
        }
    }

    fn spawn_ticker(&self, id: u64) -> PlayerResult<Ticker> {
        let (cancel_tx, cancel_rx) = std_mpsc::channel();
        let (done_tx, done_rx) = std_mpsc::channel();
        let session = Arc::clone(&self.session);
        let clock = Arc::clone(&self.clock);
        let interval = self.config.poll_interval;
        let events = self.event_sender.clone();

        let thread = thread::Builder::new()
            .name(format!("tapedeck-position-{}", id))
            .spawn(move || run_position_loop(id, session, clock, interval, cancel_rx, done_tx, events))
            .map_err(|e| PlayerError::Output(format!("failed to spawn position loop: {}", e)))?;

        Ok(Ticker {
            id,
            cancel: cancel_tx,
            done: done_rx,
            thread,
        })
    }

    /// `Loaded` or `Stopped` to `Playing`. False if there is nothing to play
    /// or it is already playing.
    pub fn play(&self) -> bool {
        match self.try_play() {
            Ok(started) => started,
            Err(e) => {
                warn!("Play failed: {}", e);
                self.emit(PlayerEvent::Error(e.to_string()));
                false
            }
        }
    }

    fn try_play(&self) -> PlayerResult<bool> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let mut engine = lock(&self.engine);
        let (state, path, offset) = {
            let session = lock(&self.session);
            let state = session.state();
            if !matches!(state, TransportState::Loaded | TransportState::Stopped) {
                return Ok(false);
            }
            let path = session.playable_path().ok_or(PlayerError::NothingLoaded)?;
            let offset = if session.has_ended() { 0.0 } else { session.position() };
            (state, path, offset)
        };

        // Loop left over from a track that ran to its end
        self.cancel_ticker();

        if state == TransportState::Stopped {
            engine.open(&path)?;
        }
        let start = (offset > 0.0).then(|| Duration::from_secs_f64(offset));
        engine.play(start)?;

        let id = self.tickers.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut session = lock(&self.session);
            session.begin_playing(self.clock.now());
            session.grant_ticker(id);
        }
        let ticker = self.spawn_ticker(id)?;
        *lock(&self.ticker) = Some(ticker);
        drop(engine);

        debug!("Playback started at {:.1}s", offset);
        self.emit(PlayerEvent::TrackStarted);
        Ok(true)
    }

    pub fn pause(&self) -> bool {
        let mut engine = lock(&self.engine);
        let mut session = lock(&self.session);
        if session.state() != TransportState::Playing {
            return false;
        }

        engine.pause();
        session.freeze(self.clock.now());
        let position = session.position();
        drop(session);
        drop(engine);

        debug!("Paused at {:.1}s", position);
        self.emit(PlayerEvent::TrackPaused(position));
        true
    }

    pub fn resume(&self) -> bool {
        let mut engine = lock(&self.engine);
        let mut session = lock(&self.session);
        if session.state() != TransportState::Paused {
            return false;
        }

        engine.resume();
        session.begin_playing(self.clock.now());
        let position = session.position();
        drop(session);
        drop(engine);

        debug!("Resumed at {:.1}s", position);
        self.emit(PlayerEvent::TrackResumed(position));
        true
    }

    /// Always succeeds. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut engine = lock(&self.engine);
        engine.stop();
        self.cancel_ticker();
        let (artifact, was_active) = {
            let mut session = lock(&self.session);
            let was_active = matches!(
                session.state(),
                TransportState::Loaded | TransportState::Playing | TransportState::Paused
            );
            (session.stop(), was_active)
        };
        drop(engine);

        // The loop is gone, nothing reads the file anymore
        if let Some(mut artifact) = artifact {
            artifact.release();
        }

        if was_active {
            info!("Playback stopped");
            self.emit(PlayerEvent::TrackStopped);
        }
    }

    /// Jump to `target` seconds. False when the duration is unknown, the target
    /// is out of range, or the audio could not be reopened.
    pub fn seek(&self, target: f64) -> bool {
        match self.try_seek(target) {
            Ok(()) => true,
            Err(e) => {
                debug!("Seek rejected: {}", e);
                false
            }
        }
    }

    /// Seek to a 0.0..=1.0 fraction of the track, the way a progress slider does.
    pub fn seek_fraction(&self, fraction: f64) -> bool {
        if !(0.0..=1.0).contains(&fraction) {
            return false;
        }
        let duration = lock(&self.session).duration();
        duration > 0.0 && self.seek(fraction * duration)
    }

    pub fn try_seek(&self, target: f64) -> PlayerResult<()> {
        let mut engine = lock(&self.engine);
        let mut session = lock(&self.session);

        let duration = session.duration();
        if duration <= 0.0 {
            return Err(PlayerError::SeekFailed("track length unknown".to_string()));
        }
        if !target.is_finite() || target < 0.0 || target > duration {
            return Err(PlayerError::SeekFailed(format!(
                "{:.1}s is outside 0..{:.1}s",
                target, duration
            )));
        }

        let state = session.state();
        let path = session
            .playable_path()
            .ok_or_else(|| PlayerError::SeekFailed("audio is no longer available".to_string()))?;

        // Reload based: reopen first so a failure leaves everything as it was
        engine
            .open(&path)
            .map_err(|e| PlayerError::SeekFailed(e.to_string()))?;

        if matches!(state, TransportState::Playing | TransportState::Paused) {
            let paused = state == TransportState::Paused;
            engine.stop();

            if let Err(e) = start_at(&mut **engine, target, paused) {
                // Put output back where the session says it is
                let now = self.clock.now();
                let current = session.position_at(now);
                match start_at(&mut **engine, current, paused) {
                    Ok(()) => {
                        warn!("Seek to {:.1}s failed, restarted at {:.1}s: {}", target, current, e);
                        session.reposition(current, now);
                    }
                    Err(again) => {
                        warn!("Output lost after failed seek: {}", again);
                        session.halt(now);
                        drop(session);
                        drop(engine);
                        self.emit(PlayerEvent::Error(again.to_string()));
                    }
                }
                return Err(PlayerError::SeekFailed(e.to_string()));
            }
        }

        session.reposition(target, self.clock.now());
        drop(session);
        drop(engine);

        debug!("Seeked to {:.1}s", target);
        self.emit(PlayerEvent::Seeked(target));
        Ok(())
    }

    /// Clamps to 0..=100 and applies immediately.
    pub fn set_volume(&self, percent: i64) -> bool {
        let volume = percent.clamp(0, 100) as u8;
        let mut engine = lock(&self.engine);
        engine.set_volume(f32::from(volume) / 100.0);
        lock(&self.session).set_volume(volume);
        drop(engine);

        self.emit(PlayerEvent::VolumeChanged(volume));
        true
    }

    /// Volume from user text, e.g. a slider value. False on anything non-numeric.
    pub fn set_volume_input(&self, raw: &str) -> bool {
        match parse_volume(raw) {
            Ok(percent) => self.set_volume(percent),
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    pub fn get_status(&self) -> PlaybackStatus {
        lock(&self.session).status()
    }

    /// Path of the current staging file, if the session owns one.
    pub fn staging_path(&self) -> Option<std::path::PathBuf> {
        lock(&self.session).artifact_path()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Terminal: stop, join the loop (bounded), delete staged bytes, release the
    /// output device. Repeated calls return immediately.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Tearing down playback controller");

        // Anything still fetching will find itself superseded
        self.loads.fetch_add(1, Ordering::SeqCst);

        let mut engine = lock(&self.engine);
        engine.stop();
        self.cancel_ticker();
        let artifact = lock(&self.session).clear();
        if let Some(mut artifact) = artifact {
            artifact.release();
        }
        engine.release();
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn start_at(engine: &mut dyn AudioEngine, seconds: f64, paused: bool) -> PlayerResult<()> {
    engine.play(Some(Duration::from_secs_f64(seconds)))?;
    if paused {
        engine.pause();
    }
    Ok(())
}

/// Integers pass through, decimals are truncated, anything else is rejected.
pub fn parse_volume(raw: &str) -> PlayerResult<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.trunc() as i64),
        _ => Err(PlayerError::VolumeRejected(raw.to_string())),
    }
}
