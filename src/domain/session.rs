//! Transcode session status and progress reports.

use serde::{Deserialize, Serialize};

/// Lifecycle of a transcode session.
///
/// Transitions only move forward: `Pending -> Running -> {Completed, Failed, Halted}`.
/// A terminal session is never restarted in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SessionStatus {
    /// Created, encoder not yet invoked
    Pending,

    /// Encoder running
    Running,

    /// Encoder finished successfully
    Completed,

    /// Encoder failed
    Failed { error: String },

    /// Stopped at a checkpoint after a halt request
    Halted,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SessionStatus {
    /// Position in the lifecycle; terminal states share the last rank
    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Running => 1,
            SessionStatus::Completed | SessionStatus::Failed { .. } | SessionStatus::Halted => 2,
        }
    }

    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Check if moving to `next` keeps the lifecycle monotonic
    pub fn can_transition_to(&self, next: &SessionStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Short label for logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed { .. } => "failed",
            SessionStatus::Halted => "halted",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Failed { error } => write!(f, "failed: {}", error),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// One progress increment reported by the encoder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Frames encoded so far
    pub frame: Option<u64>,

    /// Current encode speed in frames per second
    pub fps: Option<f64>,

    /// Position in the output timeline, microseconds
    pub out_time_us: Option<i64>,

    /// Bytes written to the output so far
    pub total_size: Option<u64>,

    /// Speed relative to realtime, as reported (e.g. "1.5x")
    pub speed: Option<String>,

    /// Set on the final report
    pub finished: bool,
}
