//! Identity and classification types shared by every content node.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content type advertised for containers unless a classifier overrides it.
pub const CONTAINER_CONTENT_TYPE: &str = "x-container/tivo-videos";

/// Content type advertised for playable items unless a classifier overrides it.
pub const ITEM_CONTENT_TYPE: &str = "video/x-tivo-mpeg";

/// Stable node identifier (SHA256(parent id + "/" + source key)[0:16])
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Identifier for a tree root, derived from its title
    pub fn root(title: &str) -> Self {
        Self::hash(&[title.as_bytes()])
    }

    /// Identifier for a child node, derived from its parent and source key
    pub fn child(parent: &NodeId, key: &str) -> Self {
        Self::hash(&[parent.0.as_bytes(), b"/", key.as_bytes()])
    }

    fn hash(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let digest = hasher.finalize();

        // First 8 bytes (16 hex chars)
        Self(hex::encode(&digest[..8]))
    }

    /// Get the raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

/// Kind of a node in the content tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Playable leaf
    Item,

    /// Groups items and sub-containers
    Container,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            NodeKind::Item => "item",
            NodeKind::Container => "container",
        };
        f.pad(label)
    }
}

/// Descriptive metadata a source may attach to a node.
///
/// Every field is optional; renderers show what is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Running time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Size of the source media in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
}

impl NodeMetadata {
    /// Check if no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }

    /// End of a showing that starts at `start`, when the duration is known
    pub fn stop_time(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let duration = chrono::Duration::from_std(self.duration()?).ok()?;
        start.checked_add_signed(duration)
    }
}
