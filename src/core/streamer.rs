//! Playback entry point.
//!
//! Pairs a fresh transcode session with a relay for every playback request.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::{info, instrument};

use super::relay::{RelayError, RelayOutcome, RelaySettings, StreamRelay};
use super::session::{SessionError, SessionOptions, TranscodeSession};
use crate::adapters::{Encoder, FfmpegEncoder, ProgressObserver};
use crate::config::Config;
use crate::domain::EncodingProfile;
use crate::library::{ContentNode, LibraryError};

/// Errors from a playback request
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Starts sessions and relays them to client sinks
pub struct Streamer {
    encoder: Arc<dyn Encoder>,
    profile: EncodingProfile,
    relay: RelaySettings,
    session: SessionOptions,
}

impl Streamer {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        profile: EncodingProfile,
        relay: RelaySettings,
        session: SessionOptions,
    ) -> Self {
        Self {
            encoder,
            profile,
            relay,
            session,
        }
    }

    /// Streamer backed by the configured ffmpeg binary
    pub fn from_config(config: &Config) -> Self {
        let encoder = Arc::new(FfmpegEncoder::with_binary_path(&config.encoder.binary));
        let session = SessionOptions {
            checkpoint_interval: config.encoder.checkpoint_interval,
            store_dir: None,
        };
        Self::new(encoder, config.profile.clone(), config.relay.clone(), session)
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    pub fn profile(&self) -> &EncodingProfile {
        &self.profile
    }

    /// Playback identifier of `node`, or `NotPlayable` for containers and
    /// items without one
    pub fn playable_identifier(node: &ContentNode) -> Result<&str, LibraryError> {
        match node.identifier() {
            Some(id) if !node.is_container() => Ok(id),
            _ => Err(LibraryError::NotPlayable {
                title: node.title().to_string(),
            }),
        }
    }

    /// Transcode a content item into `sink`
    #[instrument(skip_all, fields(item = %node.title_path()))]
    pub async fn stream<W>(
        &self,
        node: &ContentNode,
        sink: &mut W,
        observer: Option<ProgressObserver>,
    ) -> Result<RelayOutcome, StreamError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let identifier = Self::playable_identifier(node)?;
        self.stream_source(identifier, sink, observer).await
    }

    /// Transcode an arbitrary playback identifier into `sink`
    pub async fn stream_source<W>(
        &self,
        identifier: &str,
        sink: &mut W,
        observer: Option<ProgressObserver>,
    ) -> Result<RelayOutcome, StreamError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let session = TranscodeSession::start(
            Arc::clone(&self.encoder),
            identifier,
            self.profile.clone(),
            self.session.clone(),
            observer,
        )?;
        info!(session = %session.id(), source = identifier, "Playback started");

        let mut relay = StreamRelay::new(self.relay.clone());
        let outcome = relay.relay(&session, sink).await?;
        Ok(outcome)
    }
}
