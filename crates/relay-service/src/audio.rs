//! Audio retrieval and conversion.

use async_trait::async_trait;
use relay_core::Interface;
use shaku::Component;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest ffmpeg stderr excerpt kept in an error.
const STDERR_EXCERPT: usize = 1000;

/// A temporary file owned by one job. Dropping it deletes the file.
///
/// Deletion also runs when the owning future is dropped mid-flight, so a job
/// cancelled by its timeout still cleans up. A file that was never written is
/// ignored.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// Takes ownership of `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Temporary artifact deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to delete temporary artifact"),
        }
    }
}

/// Credentials for fetching provider-hosted media.
#[derive(Debug, Clone, Default)]
pub struct MediaCredentials {
    pub username: String,
    pub password: String,
}

impl MediaCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Audio retrieval and conversion errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Transport failure while fetching media.
    #[error("Media request failed: {0}")]
    Request(String),

    /// Media server answered with a non-success status.
    #[error("Media request returned HTTP {0}")]
    Status(u16),

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transcoder could not be started.
    #[error("Failed to start transcoder '{program}': {message}")]
    Spawn { program: String, message: String },

    /// The transcoder exited non-zero.
    #[error("Transcoder exited with code {code:?}: {stderr}")]
    ConversionFailed { code: Option<i32>, stderr: String },
}

/// Fetches and transcodes voice-message audio.
#[async_trait]
pub trait AudioService: Interface {
    /// Downloads media with basic auth, following redirects, into a new
    /// uniquely named `.ogg` file.
    async fn download(
        &self,
        url: &str,
        credentials: &MediaCredentials,
    ) -> Result<TempArtifact, AudioError>;

    /// Transcodes to MP3 next to the input, with the same file stem.
    async fn convert(&self, input: &TempArtifact) -> Result<TempArtifact, AudioError>;
}

/// HTTP download plus ffmpeg conversion.
#[derive(Component)]
#[shaku(interface = AudioService)]
pub struct HttpAudioService {
    client: reqwest::Client,
    ffmpeg_path: String,
    temp_dir: PathBuf,
    download_timeout: Duration,
}

impl HttpAudioService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        ffmpeg_path: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
        download_timeout: Duration,
    ) -> Self {
        Self {
            client,
            ffmpeg_path: ffmpeg_path.into(),
            temp_dir: temp_dir.into(),
            download_timeout,
        }
    }

    fn temp_dir(&self) -> PathBuf {
        if self.temp_dir.as_os_str().is_empty() {
            std::env::temp_dir()
        } else {
            self.temp_dir.clone()
        }
    }

    fn ffmpeg(&self) -> &str {
        if self.ffmpeg_path.is_empty() {
            "ffmpeg"
        } else {
            &self.ffmpeg_path
        }
    }
}

#[async_trait]
impl AudioService for HttpAudioService {
    async fn download(
        &self,
        url: &str,
        credentials: &MediaCredentials,
    ) -> Result<TempArtifact, AudioError> {
        let mut request = self
            .client
            .get(url)
            .basic_auth(&credentials.username, Some(&credentials.password));
        if !self.download_timeout.is_zero() {
            request = request.timeout(self.download_timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AudioError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AudioError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AudioError::Request(e.to_string()))?;

        let artifact = TempArtifact::new(
            self.temp_dir()
                .join(format!("{}.ogg", Uuid::new_v4().simple())),
        );
        tokio::fs::write(artifact.path(), &bytes).await?;

        info!(
            bytes = bytes.len(),
            path = %artifact.path().display(),
            "Audio downloaded"
        );
        Ok(artifact)
    }

    async fn convert(&self, input: &TempArtifact) -> Result<TempArtifact, AudioError> {
        let output = TempArtifact::new(input.path().with_extension("mp3"));
        let program = self.ffmpeg();

        let result = Command::new(program)
            .arg("-i")
            .arg(input.path())
            .args(["-acodec", "libmp3lame", "-y"])
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AudioError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr = stderr.trim();
            let start = stderr
                .char_indices()
                .rev()
                .nth(STDERR_EXCERPT)
                .map_or(0, |(i, _)| i);
            return Err(AudioError::ConversionFailed {
                code: result.status.code(),
                stderr: stderr[start..].to_string(),
            });
        }

        debug!(path = %output.path().display(), "Audio converted");
        Ok(output)
    }
}
