//! Encoder interface for external transcoding tools.
//!
//! The core never knows which binary or library does the encoding. It hands
//! an [`Encoder`] a declarative request: the source, the profile, where to
//! write, a progress observer and a [`Checkpoint`] to poll for halt requests.

pub mod ffmpeg;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::{EncodeProgress, EncodingProfile};

// Re-export the ffmpeg encoder
pub use ffmpeg::FfmpegEncoder;

/// Callback invoked once per progress increment
pub type ProgressObserver = Arc<dyn Fn(&EncodeProgress) + Send + Sync>;

/// Ways an encode can end without completing
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Encode halted at checkpoint")]
    Halted,

    #[error("Encode failed: {0:#}")]
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for EncodeError {
    fn from(e: anyhow::Error) -> Self {
        EncodeError::Failed(e)
    }
}

/// Read-only view of a session's halt flag.
///
/// The flag is set at most once and never cleared. Encoders poll it at
/// intervals no longer than [`Checkpoint::interval`].
#[derive(Debug, Clone)]
pub struct Checkpoint {
    token: CancellationToken,
    interval: Duration,
}

impl Checkpoint {
    /// Wrap a halt token
    pub fn new(token: CancellationToken, interval: Duration) -> Self {
        Self { token, interval }
    }

    /// Maximum time an encoder may go without polling
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if a halt was requested
    pub fn is_halted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Return `Err(Halted)` if a halt was requested
    pub fn check(&self) -> Result<(), EncodeError> {
        if self.is_halted() {
            Err(EncodeError::Halted)
        } else {
            Ok(())
        }
    }
}

/// Everything an encoder needs for one job
pub struct EncodeRequest {
    /// Playback identifier of the source (path, URL, catalog key)
    pub source: String,

    /// Encoding parameters
    pub profile: EncodingProfile,

    /// Intermediate store the encoder appends to
    pub output: PathBuf,

    /// Progress callback
    pub progress: ProgressObserver,

    /// Halt flag to poll
    pub checkpoint: Checkpoint,
}

impl EncodeRequest {
    /// Forward a progress increment to the observer
    pub fn report(&self, progress: &EncodeProgress) {
        (self.progress)(progress);
    }
}

/// Trait for external encoders
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Human-readable encoder name
    fn name(&self) -> &str;

    /// Run the encode to completion, failure, or halt
    async fn encode(&self, request: EncodeRequest) -> Result<(), EncodeError>;

    /// Check the encoder is usable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_reflects_token() {
        let token = CancellationToken::new();
        let checkpoint = Checkpoint::new(token.clone(), Duration::from_millis(10));

        assert!(checkpoint.check().is_ok());
        token.cancel();
        assert!(checkpoint.is_halted());
        assert!(matches!(checkpoint.check(), Err(EncodeError::Halted)));
    }

    #[test]
    fn test_failed_display_keeps_context() {
        let err: EncodeError = anyhow::anyhow!("exit 1").context("ffmpeg failed").into();
        assert_eq!(err.to_string(), "Encode failed: ffmpeg failed: exit 1");
    }
}
