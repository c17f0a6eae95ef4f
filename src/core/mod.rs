//! Transcode-and-relay pipeline.
//!
//! This module contains:
//! - IntermediateStore: append-only temp file between encoder and relay
//! - TranscodeSession: background encode with cooperative halt
//! - StreamRelay: drains the store into a client sink
//! - Streamer: pairs a session with a relay per playback request

pub mod relay;
pub mod session;
pub mod store;
pub mod streamer;

// Re-export commonly used types
pub use relay::{RelayError, RelayOutcome, RelaySettings, StreamRelay};
pub use session::{SessionError, SessionOptions, TranscodeSession};
pub use store::{IntermediateStore, StoreReader};
pub use streamer::{StreamError, Streamer};
