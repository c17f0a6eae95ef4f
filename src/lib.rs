//! hmocast - lazily loaded media library with a transcode relay
//!
//! Serves a hierarchical content tree to media renderers and streams its
//! items through an external encoder.
//!
//! # Architecture
//!
//! - Containers fetch and classify their children the first time they are
//!   browsed, then cache them for the process lifetime
//! - Every playback starts a transcode session that writes into a private
//!   intermediate store on a background task
//! - A relay drains that store into the client sink while the encoder is
//!   still producing, and halts the session if the client goes away
//!
//! # Modules
//!
//! - `adapters`: Encoder integrations (ffmpeg)
//! - `core`: Sessions, intermediate store, relay, playback entry point
//! - `domain`: Data structures (NodeId, EncodingProfile, SessionStatus)
//! - `library`: Backing sources, classification, container tree
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # List the root of the library
//! hmocast browse
//!
//! # Transcode an item into a file
//! hmocast stream Movies "Some Film" -o film.mpg
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod library;

// Re-export main types at crate root for convenience
pub use adapters::{Encoder, FfmpegEncoder};
pub use config::Config;
pub use core::{StreamRelay, Streamer, TranscodeSession};
pub use domain::{EncodingProfile, NodeId, NodeKind, SessionStatus};
pub use library::{BackingSource, ClassifierRegistry, ContainerTree, ContentNode, SourceEntry};
