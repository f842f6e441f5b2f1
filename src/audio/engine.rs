use super::error::{PlayerError, PlayerResult};
use std::path::Path;
use std::time::Duration;

/// The black-box output engine the controller drives.
///
/// Seeking is reload based: the controller calls `open`, `stop`, then `play`
/// with the target offset.
pub trait AudioEngine: Send {
    /// Load a complete local file, failing with `Decode` if it isn't audio.
    fn open(&mut self, path: &Path) -> PlayerResult<()>;

    /// Best-effort length of the file; `ProbeFailed` when it can't tell.
    fn probe_duration(&mut self, path: &Path) -> PlayerResult<Duration>;

    fn play(&mut self, start: Option<Duration>) -> PlayerResult<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);

    /// 0.0 to 1.0
    fn set_volume(&mut self, volume: f32);

    /// Give the output device back. The engine is unusable afterwards.
    fn release(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "audio")]
pub use self::rodio_engine::RodioEngine;

#[cfg(feature = "audio")]
mod rodio_engine {
    use super::*;
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
    use std::fs::File;
    use std::io::BufReader;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::thread::{self, JoinHandle};
    use tracing::{debug, info, warn};

    /// rodio's `OutputStream` can't leave the thread that opened it, so it lives
    /// on its own thread until the guard drops its shutdown sender.
    struct DeviceGuard {
        shutdown: Option<mpsc::Sender<()>>,
        thread: Option<JoinHandle<()>>,
    }

    impl DeviceGuard {
        fn open() -> PlayerResult<(OutputStreamHandle, Self)> {
            let (ready_tx, ready_rx) = mpsc::channel();
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

            let thread = thread::Builder::new()
                .name("tapedeck-output".to_string())
                .spawn(move || match OutputStream::try_default() {
                    Ok((stream, handle)) => {
                        let _ = ready_tx.send(Ok(handle));
                        // Blocks until the guard is released
                        let _ = shutdown_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                    }
                })
                .map_err(|e| PlayerError::Output(format!("failed to spawn output thread: {}", e)))?;

            let handle = ready_rx
                .recv()
                .map_err(|_| PlayerError::Output("output thread exited early".to_string()))?
                .map_err(PlayerError::Output)?;

            Ok((
                handle,
                Self {
                    shutdown: Some(shutdown_tx),
                    thread: Some(thread),
                },
            ))
        }

        fn release(&mut self) {
            self.shutdown.take();
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    warn!("Output thread panicked while closing the device");
                }
            }
        }
    }

    impl Drop for DeviceGuard {
        fn drop(&mut self) {
            self.release();
        }
    }

    pub struct RodioEngine {
        handle: Option<OutputStreamHandle>,
        device: DeviceGuard,
        sink: Option<Sink>,
        path: Option<PathBuf>,
        volume: f32,
    }

    impl RodioEngine {
        pub fn new() -> PlayerResult<Self> {
            let (handle, device) = DeviceGuard::open()?;
            info!("Opened default audio output device");
            Ok(Self {
                handle: Some(handle),
                device,
                sink: None,
                path: None,
                volume: 1.0,
            })
        }

        fn decoder(path: &Path) -> PlayerResult<Decoder<BufReader<File>>> {
            let file = File::open(path)
                .map_err(|e| PlayerError::Decode(format!("{}: {}", path.display(), e)))?;
            Decoder::new(BufReader::new(file))
                .map_err(|e| PlayerError::Decode(format!("{}: {}", path.display(), e)))
        }
    }

    impl AudioEngine for RodioEngine {
        fn open(&mut self, path: &Path) -> PlayerResult<()> {
            // Current output keeps going until `play` or `stop`.
            // Decode the header now so a bad file fails the load, not the first play
            Self::decoder(path)?;
            self.path = Some(path.to_path_buf());
            Ok(())
        }

        fn probe_duration(&mut self, path: &Path) -> PlayerResult<Duration> {
            #[cfg(feature = "probe")]
            {
                match probe_with_symphonia(path) {
                    Ok(duration) => return Ok(duration),
                    Err(e) => debug!("symphonia probe failed, falling back to decoder: {}", e),
                }
            }

            let decoder = Self::decoder(path).map_err(|e| PlayerError::ProbeFailed(e.to_string()))?;
            decoder
                .total_duration()
                .ok_or_else(|| PlayerError::ProbeFailed("decoder does not report a length".to_string()))
        }

        fn play(&mut self, start: Option<Duration>) -> PlayerResult<()> {
            let handle = self
                .handle
                .as_ref()
                .ok_or_else(|| PlayerError::Output("output device released".to_string()))?;
            let path = self.path.clone().ok_or(PlayerError::NothingLoaded)?;

            if let Some(old) = self.sink.take() {
                old.stop();
            }

            let sink = Sink::try_new(handle).map_err(|e| PlayerError::Output(e.to_string()))?;
            sink.set_volume(self.volume);

            let source = Self::decoder(&path)?;
            match start {
                Some(offset) if !offset.is_zero() => {
                    debug!("Starting {} at {:?}", path.display(), offset);
                    sink.append(source.skip_duration(offset));
                }
                _ => sink.append(source),
            }
            sink.play();
            self.sink = Some(sink);
            Ok(())
        }

        fn pause(&mut self) {
            if let Some(sink) = &self.sink {
                sink.pause();
            }
        }

        fn resume(&mut self) {
            if let Some(sink) = &self.sink {
                sink.play();
            }
        }

        fn stop(&mut self) {
            if let Some(sink) = self.sink.take() {
                sink.stop();
            }
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume.clamp(0.0, 1.0);
            if let Some(sink) = &self.sink {
                sink.set_volume(self.volume);
            }
        }

        fn release(&mut self) {
            self.stop();
            self.path = None;
            self.handle = None;
            self.device.release();
            debug!("Released audio output device");
        }
    }

    #[cfg(feature = "probe")]
    fn probe_with_symphonia(path: &Path) -> PlayerResult<Duration> {
        use symphonia::core::formats::FormatOptions;
        use symphonia::core::io::MediaSourceStream;
        use symphonia::core::meta::MetadataOptions;
        use symphonia::core::probe::Hint;
        use symphonia::core::units::TimeBase;

        let file = File::open(path).map_err(|e| PlayerError::ProbeFailed(e.to_string()))?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| PlayerError::ProbeFailed(e.to_string()))?;

        let track = probed
            .format
            .default_track()
            .ok_or_else(|| PlayerError::ProbeFailed("no default track".to_string()))?;
        let params = &track.codec_params;
        let time_base = params
            .time_base
            .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)));

        match (params.n_frames, time_base) {
            (Some(frames), Some(tb)) => {
                let time = tb.calc_time(frames);
                Ok(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac))
            }
            _ => Err(PlayerError::ProbeFailed("stream length unknown".to_string())),
        }
    }

}
