//! Backing-source contract for containers.
//!
//! A backing source is whatever catalog or filesystem supplies the raw
//! entries of one container. The tree only ever asks it for one thing:
//! the list of entries, in source order.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::NodeMetadata;

/// Supplies the raw entries of a single container
#[async_trait]
pub trait BackingSource: Send + Sync {
    /// Human-readable description used in logs
    fn describe(&self) -> String;

    /// List the entries of this container, in source order
    async fn list_entries(&self) -> Result<Vec<SourceEntry>>;
}

/// An opaque entry returned by a backing source.
///
/// Sources fill in whatever capabilities they have; classification decides
/// what the entry becomes in the tree.
#[derive(Clone)]
pub struct SourceEntry {
    /// Source-stable key (path, catalog key, ...)
    pub key: String,

    /// Display title
    pub title: String,

    /// Source-specific kind tag ("directory", "file", "movie", ...)
    pub kind: String,

    /// Playback identifier handed to the encoder, if the entry is playable
    pub identifier: Option<String>,

    /// File name, for entries backed by a file
    pub file_name: Option<String>,

    /// Content-type override
    pub content_type: Option<String>,

    /// Creation time reported by the source
    pub created_at: Option<DateTime<Utc>>,

    /// Modification time reported by the source
    pub modified_at: Option<DateTime<Utc>>,

    /// Source for the entry's own children, if it can be listed
    pub listing: Option<Arc<dyn BackingSource>>,

    /// Descriptive metadata carried onto the node
    pub metadata: NodeMetadata,
}

impl SourceEntry {
    /// Create an entry with no capabilities
    pub fn new(key: impl Into<String>, title: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            kind: kind.into(),
            identifier: None,
            file_name: None,
            content_type: None,
            created_at: None,
            modified_at: None,
            listing: None,
            metadata: NodeMetadata::default(),
        }
    }

    /// Set the playback identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Set the file name
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Override the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set creation and modification times
    pub fn with_times(mut self, created_at: DateTime<Utc>, modified_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self.modified_at = Some(modified_at);
        self
    }

    /// Attach a source for the entry's children
    pub fn with_listing(mut self, listing: Arc<dyn BackingSource>) -> Self {
        self.listing = Some(listing);
        self
    }

    /// Attach descriptive metadata
    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceEntry")
            .field("key", &self.key)
            .field("title", &self.title)
            .field("kind", &self.kind)
            .field("identifier", &self.identifier)
            .field("file_name", &self.file_name)
            .field("listing", &self.listing.as_ref().map(|s| s.describe()))
            .finish()
    }
}

/// A fixed list of entries
#[derive(Clone, Default)]
pub struct StaticSource {
    name: String,
    entries: Vec<SourceEntry>,
}

impl StaticSource {
    /// Create a static source
    pub fn new(name: impl Into<String>, entries: Vec<SourceEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

#[async_trait]
impl BackingSource for StaticSource {
    fn describe(&self) -> String {
        format!("static:{}", self.name)
    }

    async fn list_entries(&self) -> Result<Vec<SourceEntry>> {
        Ok(self.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_preserves_order() {
        let source = StaticSource::new(
            "fixture",
            vec![
                SourceEntry::new("b", "B", "file"),
                SourceEntry::new("a", "A", "file"),
            ],
        );

        let entries = source.list_entries().await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(source.describe(), "static:fixture");
    }

    #[test]
    fn test_entry_builder() {
        let child = Arc::new(StaticSource::new("child", Vec::new()));
        let entry = SourceEntry::new("k", "Title", "directory").with_listing(child);

        assert!(entry.listing.is_some());
        assert!(entry.identifier.is_none());
        assert!(format!("{:?}", entry).contains("static:child"));
    }
}
