// Staging area for remote tracks - the engine wants a complete, seekable file,
// so fetched bytes land in a temp file owned by exactly one session.

use super::error::PlayerResult;
use super::AudioFormat;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StagingConfig {
    pub dir: Option<PathBuf>,
    pub prefix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: "tapedeck-".to_string(),
        }
    }
}

/// Creates staging artifacts. One per remote load.
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    config: StagingConfig,
}

impl StagingArea {
    pub fn new(config: StagingConfig) -> Self {
        Self { config }
    }

    pub fn create(&self, format: &AudioFormat) -> PlayerResult<StagingWriter> {
        let suffix = format!(".{}", format.staging_extension());
        let mut builder = Builder::new();
        builder.prefix(&self.config.prefix).suffix(&suffix);

        let file = match &self.config.dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };

        debug!("Created staging file {}", file.path().display());
        Ok(StagingWriter { file, written: 0 })
    }
}

/// Open handle used while bytes are still arriving.
pub struct StagingWriter {
    file: tempfile::NamedTempFile,
    written: u64,
}

impl StagingWriter {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    #[cfg(test)]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and close the file, keeping it on disk under the artifact's ownership.
    pub fn finish(mut self) -> PlayerResult<StagingArtifact> {
        self.file.flush()?;
        let written = self.written;
        let path = self.file.into_temp_path();
        Ok(StagingArtifact {
            path: Some(path),
            bytes: written,
        })
    }
}

impl Write for StagingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Downloaded bytes on disk. Deleted on `release` or drop, exactly once.
#[derive(Debug)]
pub struct StagingArtifact {
    path: Option<TempPath>,
    bytes: u64,
}

impl StagingArtifact {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[cfg(test)]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        self.path.is_none()
    }

    /// Delete the file now. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!("Released staging file {} ({} bytes)", shown, self.bytes),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Staging file {} already gone", shown)
                }
                Err(e) => warn!("Failed to delete staging file {}: {}", shown, e),
            }
        }
    }
}

impl Drop for StagingArtifact {
    fn drop(&mut self) {
        self.release();
    }
}
