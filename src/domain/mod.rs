//! Domain types for hmocast.
//!
//! - Node: identity and kind of content-tree nodes
//! - Profile: declarative encoding parameters
//! - Session: transcode lifecycle and progress

pub mod node;
pub mod profile;
pub mod session;

// Re-export commonly used types
pub use node::{NodeId, NodeKind, NodeMetadata, CONTAINER_CONTENT_TYPE, ITEM_CONTENT_TYPE};
pub use profile::EncodingProfile;
pub use session::{EncodeProgress, SessionStatus};
