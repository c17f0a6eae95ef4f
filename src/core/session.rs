//! Transcode sessions.
//!
//! A session runs one encode on a background task, writing into its own
//! intermediate store. Failures never cross the task boundary: they end up
//! as the session's terminal status. Halting is cooperative; the encoder
//! notices at its next checkpoint.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::store::IntermediateStore;
use crate::adapters::{Checkpoint, EncodeError, EncodeRequest, Encoder, ProgressObserver};
use crate::domain::{EncodeProgress, EncodingProfile, SessionStatus};

/// Errors raised while starting a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to create intermediate store: {0}")]
    Store(#[from] io::Error),
}

/// Per-session settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Maximum time between halt checks inside the encoder
    pub checkpoint_interval: Duration,

    /// Directory for the intermediate store (system temp dir if unset)
    pub store_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            checkpoint_interval: Duration::from_millis(250),
            store_dir: None,
        }
    }
}

struct Shared {
    id: Uuid,
    source: String,
    store: Arc<IntermediateStore>,
    halt: CancellationToken,
    alive: AtomicBool,
    status: watch::Receiver<SessionStatus>,
}

/// Handle to a running or finished transcode
#[derive(Clone)]
pub struct TranscodeSession {
    inner: Arc<Shared>,
}

impl TranscodeSession {
    /// Launch the encoder in the background and return immediately
    pub fn start(
        encoder: Arc<dyn Encoder>,
        source: impl Into<String>,
        profile: EncodingProfile,
        options: SessionOptions,
        observer: Option<ProgressObserver>,
    ) -> Result<Self, SessionError> {
        let source = source.into();
        let store = match options.store_dir {
            Some(ref dir) => IntermediateStore::create_in(dir)?,
            None => IntermediateStore::create()?,
        };

        let (status_tx, status_rx) = watch::channel(SessionStatus::Pending);
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            source,
            store: Arc::new(store),
            halt: CancellationToken::new(),
            alive: AtomicBool::new(true),
            status: status_rx,
        });

        let session = Self {
            inner: Arc::clone(&shared),
        };

        let request = EncodeRequest {
            source: shared.source.clone(),
            profile,
            output: shared.store.path().to_path_buf(),
            progress: progress_observer(observer),
            checkpoint: Checkpoint::new(shared.halt.clone(), options.checkpoint_interval),
        };

        let span = tracing::info_span!("transcode", session = %shared.id, encoder = encoder.name());
        tokio::spawn(run_encode(encoder, request, TaskGuard { shared, status_tx }).instrument(span));

        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Playback identifier being encoded
    pub fn source(&self) -> &str {
        &self.inner.source
    }

    /// Intermediate store the encoder writes to
    pub fn store(&self) -> &Arc<IntermediateStore> {
        &self.inner.store
    }

    /// Current status; never blocks
    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    /// True until the background task has recorded its terminal status and exited
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// Request a cooperative stop; takes effect at the encoder's next checkpoint
    pub fn halt(&self) {
        if !self.inner.halt.is_cancelled() {
            info!(session = %self.inner.id, "Halt requested");
            self.inner.halt.cancel();
        }
    }

    /// Check if a halt was requested
    pub fn is_halt_requested(&self) -> bool {
        self.inner.halt.is_cancelled()
    }

    /// Wait until the session reaches a terminal status
    pub async fn wait(&self) -> SessionStatus {
        let mut status = self.inner.status.clone();
        let result = status.wait_for(|s| s.is_terminal()).await.map(|s| s.clone());
        result.unwrap_or_else(|_| self.status())
    }
}

impl std::fmt::Debug for TranscodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeSession")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("status", &self.status())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Logs every increment and forwards it to the caller's observer
fn progress_observer(observer: Option<ProgressObserver>) -> ProgressObserver {
    Arc::new(move |progress: &EncodeProgress| {
        debug!(
            frame = ?progress.frame,
            out_time_us = ?progress.out_time_us,
            total_size = ?progress.total_size,
            speed = ?progress.speed,
            "Transcoding progress"
        );
        if let Some(ref observer) = observer {
            observer(progress);
        }
    })
}

/// Owns the status sender for the task's lifetime.
///
/// Dropping it (normally or while unwinding) settles a terminal status
/// before clearing the liveness flag.
struct TaskGuard {
    shared: Arc<Shared>,
    status_tx: watch::Sender<SessionStatus>,
}

impl TaskGuard {
    fn transition(&self, next: SessionStatus) {
        self.status_tx.send_if_modified(|current| {
            if current.can_transition_to(&next) {
                *current = next;
                true
            } else {
                warn!(from = %current, to = %next, "Ignoring non-monotonic status transition");
                false
            }
        });
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if !self.status_tx.borrow().is_terminal() {
            self.transition(SessionStatus::Failed {
                error: "encoder task ended unexpectedly".to_string(),
            });
        }
        self.shared.alive.store(false, Ordering::Release);
    }
}

async fn run_encode(encoder: Arc<dyn Encoder>, request: EncodeRequest, guard: TaskGuard) {
    if request.checkpoint.is_halted() {
        info!("Halted before the encoder started");
        guard.transition(SessionStatus::Halted);
        return;
    }

    info!(source = %request.source, output = %request.output.display(), "Starting transcode");
    guard.transition(SessionStatus::Running);

    let output = request.output.clone();
    let next = match encoder.encode(request).await {
        Ok(()) => {
            let size = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
            info!(bytes = size, "Transcode completed");
            SessionStatus::Completed
        }
        Err(EncodeError::Halted) => {
            info!("Transcode halted");
            SessionStatus::Halted
        }
        Err(EncodeError::Failed(e)) => {
            let message = format!("{:#}", e);
            error!(error = %message, "Transcode failed");
            SessionStatus::Failed { error: message }
        }
    };

    guard.transition(next);
}
