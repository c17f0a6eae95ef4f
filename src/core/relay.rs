//! Stream relay: drains a session's intermediate store into a sink.
//!
//! The relay and the encoder share nothing but the store and two flags
//! (liveness, halt). The relay keeps going while the encoder is alive, since
//! reaching the end of the store may only mean it has not caught up yet, and
//! after the encoder dies it keeps going until every byte already written
//! has been forwarded.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::session::TranscodeSession;
use super::store::StoreReader;
use crate::domain::SessionStatus;

/// Relay polling and stall policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Sleep between drain passes (default: 200ms)
    pub poll_interval: Duration,

    /// Read size per chunk (default: 4096)
    pub chunk_size: usize,

    /// Give up when the encoder is alive but silent this long (default: never)
    pub stall_timeout: Option<Duration>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            chunk_size: 4096,
            stall_timeout: None,
        }
    }
}

/// How a relay finished when the sink took every byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Bytes written to the sink
    pub bytes_forwarded: u64,

    /// Terminal status of the paired session
    pub status: SessionStatus,
}

/// Relay failures
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Sink write failed after {bytes_forwarded} bytes: {source}")]
    SinkWrite {
        bytes_forwarded: u64,
        #[source]
        source: io::Error,
    },

    #[error("Encode failed after {bytes_forwarded} bytes were forwarded: {error}")]
    EncodeFailure { bytes_forwarded: u64, error: String },

    #[error("Encoder produced nothing for {stalled_for:?} ({bytes_forwarded} bytes forwarded)")]
    Stalled {
        bytes_forwarded: u64,
        stalled_for: Duration,
    },

    #[error("Intermediate store error: {0}")]
    Store(#[from] io::Error),
}

impl RelayError {
    /// Bytes that reached the sink before the failure, when known
    pub fn bytes_forwarded(&self) -> Option<u64> {
        match self {
            RelayError::SinkWrite { bytes_forwarded, .. }
            | RelayError::EncodeFailure { bytes_forwarded, .. }
            | RelayError::Stalled { bytes_forwarded, .. } => Some(*bytes_forwarded),
            RelayError::Store(_) => None,
        }
    }
}

/// Consumer half of a playback: forwards encoded bytes strictly in order
#[derive(Debug)]
pub struct StreamRelay {
    settings: RelaySettings,
    bytes_forwarded: u64,
}

impl StreamRelay {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            bytes_forwarded: 0,
        }
    }

    /// Bytes written to the sink so far; never decreases
    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded
    }

    /// Forward everything `session` produces into `sink`.
    ///
    /// Any sink failure halts the session and is returned immediately.
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn relay<W>(&mut self, session: &TranscodeSession, sink: &mut W) -> Result<RelayOutcome, RelayError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let store = Arc::clone(session.store());
        let mut reader = match store.open_reader().await {
            Ok(reader) => reader,
            Err(e) => {
                session.halt();
                return Err(RelayError::Store(e));
            }
        };
        let mut buf = vec![0u8; self.settings.chunk_size.max(1)];
        let mut last_data = Instant::now();

        info!(store = %store.path().display(), "Starting stream copy");

        loop {
            // Liveness is sampled before size: once the encoder is seen dead,
            // the size read after it is final.
            let alive = session.is_alive();
            let size = match store.size().await {
                Ok(size) => size,
                Err(e) => {
                    session.halt();
                    return Err(RelayError::Store(e));
                }
            };

            if !alive && self.bytes_forwarded >= size {
                break;
            }

            sleep(self.settings.poll_interval).await;

            let forwarded = self.drain(session, &mut reader, &mut buf, sink).await?;
            if forwarded > 0 {
                last_data = Instant::now();
                continue;
            }

            if let Some(limit) = self.settings.stall_timeout {
                let stalled_for = last_data.elapsed();
                if alive && stalled_for >= limit {
                    warn!(?stalled_for, "Encoder stalled, halting session");
                    session.halt();
                    return Err(RelayError::Stalled {
                        bytes_forwarded: self.bytes_forwarded,
                        stalled_for,
                    });
                }
            }
        }

        let status = session.status();
        info!(bytes = self.bytes_forwarded, status = %status, "Stream copy completed");

        match status {
            SessionStatus::Failed { error } => Err(RelayError::EncodeFailure {
                bytes_forwarded: self.bytes_forwarded,
                error,
            }),
            status => Ok(RelayOutcome {
                bytes_forwarded: self.bytes_forwarded,
                status,
            }),
        }
    }

    /// Copy every currently readable byte; returns how many were forwarded
    async fn drain<W>(
        &mut self,
        session: &TranscodeSession,
        reader: &mut StoreReader,
        buf: &mut [u8],
        sink: &mut W,
    ) -> Result<u64, RelayError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut forwarded = 0u64;

        loop {
            let n = match reader.read_chunk(buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    session.halt();
                    return Err(RelayError::Store(e));
                }
            };

            // Count every accepted write so a failure reports exact progress
            let mut offset = 0;
            while offset < n {
                match sink.write(&buf[offset..n]).await {
                    Ok(0) => {
                        let source = io::Error::new(io::ErrorKind::WriteZero, "sink accepted no bytes");
                        return Err(self.sink_failed(session, source));
                    }
                    Ok(k) => {
                        offset += k;
                        self.bytes_forwarded += k as u64;
                        forwarded += k as u64;
                    }
                    Err(source) => return Err(self.sink_failed(session, source)),
                }
            }
        }

        if forwarded > 0 {
            if let Err(source) = sink.flush().await {
                return Err(self.sink_failed(session, source));
            }
            debug!(chunk = forwarded, total = self.bytes_forwarded, "Forwarded bytes");
        }

        Ok(forwarded)
    }

    fn sink_failed(&self, session: &TranscodeSession, source: io::Error) -> RelayError {
        warn!(bytes = self.bytes_forwarded, error = %source, "Stream copy failed, halting transcode");
        session.halt();
        RelayError::SinkWrite {
            bytes_forwarded: self.bytes_forwarded,
            source,
        }
    }
}
