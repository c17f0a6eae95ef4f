//! Lazily populated content tree.
//!
//! Each container asks its backing source for entries the first time its
//! children are requested and caches the result for the rest of its
//! lifetime. Population is guarded per node, so unrelated subtrees load in
//! parallel while concurrent first callers on the same node wait for the
//! single fetch.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::classify::{Classification, ClassifierRegistry, NodeSeed};
use super::filesystem::FilesystemSource;
use super::source::{BackingSource, SourceEntry, StaticSource};
use crate::config::Config;
use crate::domain::{NodeId, NodeKind, NodeMetadata, CONTAINER_CONTENT_TYPE};

/// Errors raised while navigating the tree
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Backing source unavailable for '{container}': {error:#}")]
    SourceUnavailable {
        container: String,
        error: anyhow::Error,
    },

    #[error("No node at path '{path}'")]
    NotFound { path: String },

    #[error("'{title}' is not a playable item")]
    NotPlayable { title: String },
}

/// A node in the content tree
pub struct ContentNode {
    id: NodeId,
    kind: NodeKind,
    title: String,
    content_type: String,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    identifier: Option<String>,
    metadata: NodeMetadata,
    parent: Weak<ContentNode>,
    source: Option<Arc<dyn BackingSource>>,
    classifier: Arc<ClassifierRegistry>,
    populate_lock: Mutex<()>,
    children: OnceLock<Vec<Arc<ContentNode>>>,
}

impl ContentNode {
    fn build(
        id: NodeId,
        kind: NodeKind,
        seed: NodeSeed,
        parent: Weak<ContentNode>,
        classifier: Arc<ClassifierRegistry>,
    ) -> Self {
        let children = OnceLock::new();
        // Nothing to fetch: the node starts out populated
        if kind == NodeKind::Item || seed.listing.is_none() {
            let _ = children.set(Vec::new());
        }

        Self {
            id,
            kind,
            title: seed.title,
            content_type: seed.content_type,
            created_at: seed.created_at,
            modified_at: seed.modified_at,
            identifier: seed.identifier,
            metadata: seed.metadata,
            parent,
            source: if kind == NodeKind::Container { seed.listing } else { None },
            classifier,
            populate_lock: Mutex::new(()),
            children,
        }
    }

    fn new_child(self: &Arc<Self>, kind: NodeKind, seed: NodeSeed) -> Arc<Self> {
        let id = NodeId::child(&self.id, &seed.key);
        Arc::new(Self::build(
            id,
            kind,
            seed,
            Arc::downgrade(self),
            Arc::clone(&self.classifier),
        ))
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_container(&self) -> bool {
        self.kind == NodeKind::Container
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Playback identifier handed to the encoder (items only)
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Parent node, if it is still alive
    /// Descriptive metadata supplied by the source
    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    pub fn parent(&self) -> Option<Arc<ContentNode>> {
        self.parent.upgrade()
    }

    /// Whether children have been fetched (always true for items)
    pub fn is_populated(&self) -> bool {
        self.children.get().is_some()
    }

    /// Titles from the first level below the root down to this node
    pub fn path_segments(&self) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = self.parent();
        if current.is_some() {
            segments.push(self.title.clone());
        }
        while let Some(node) = current {
            current = node.parent();
            // The root's own title is not part of a lookup path
            if current.is_some() {
                segments.push(node.title.clone());
            }
        }
        segments.reverse();
        segments
    }

    /// Slash-joined titles from the root to this node, for diagnostics
    pub fn title_path(&self) -> String {
        let mut titles = vec![self.title.clone()];
        let mut current = self.parent();
        while let Some(node) = current {
            titles.push(node.title.clone());
            current = node.parent();
        }
        titles.reverse();
        titles.join("/")
    }

    /// Children in source order, fetching them on first access.
    ///
    /// A failed fetch leaves the node unpopulated so the next call retries.
    pub async fn children(self: &Arc<Self>) -> Result<&[Arc<ContentNode>], LibraryError> {
        if let Some(children) = self.children.get() {
            return Ok(children);
        }

        let _guard = self.populate_lock.lock().await;

        // Another caller may have finished populating while we waited
        if let Some(children) = self.children.get() {
            return Ok(children);
        }

        let fetched = self.populate().await?;
        Ok(self.children.get_or_init(|| fetched))
    }

    #[instrument(skip(self), fields(container = %self.title_path()))]
    async fn populate(self: &Arc<Self>) -> Result<Vec<Arc<ContentNode>>, LibraryError> {
        let Some(source) = self.source.as_ref() else {
            return Ok(Vec::new());
        };

        debug!(source = %source.describe(), "Populating container");

        let entries = source.list_entries().await.map_err(|error| {
            warn!(source = %source.describe(), error = %error, "Failed to list container entries");
            LibraryError::SourceUnavailable {
                container: self.title_path(),
                error,
            }
        })?;

        let mut children = Vec::with_capacity(entries.len());
        let mut titles = HashSet::with_capacity(entries.len());
        for entry in entries {
            let (kind, mut seed) = match self.classifier.classify(entry) {
                Classification::Item(seed) => (NodeKind::Item, seed),
                Classification::Container(seed) => (NodeKind::Container, seed),
                Classification::Unknown(entry) => {
                    warn!(key = %entry.key, kind = %entry.kind, "Unknown entry type, skipping");
                    continue;
                }
            };

            seed.title = unique_title(&mut titles, seed.title);
            children.push(self.new_child(kind, seed));
        }

        info!(children = children.len(), "Container populated");
        Ok(children)
    }

    /// Snapshot of the fields a document renderer consumes
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id.clone(),
            kind: self.kind,
            title: self.title.clone(),
            content_type: self.content_type.clone(),
            created_at: self.created_at,
            modified_at: self.modified_at,
            metadata: self.metadata.clone(),
            child_count: self.children.get().map(Vec::len),
        }
    }
}

impl std::fmt::Debug for ContentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("title", &self.title)
            .field("populated", &self.is_populated())
            .finish()
    }
}

/// Claim `title` among its siblings, suffixing " (2)", " (3)", ... on a clash
fn unique_title(taken: &mut HashSet<String>, title: String) -> String {
    if taken.insert(title.clone()) {
        return title;
    }

    let mut n = 2;
    loop {
        let candidate = format!("{} ({})", title, n);
        if taken.insert(candidate.clone()) {
            debug!(title = %title, renamed = %candidate, "Duplicate sibling title");
            return candidate;
        }
        n += 1;
    }
}

/// Renderer-facing view of a node
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub kind: NodeKind,
    pub title: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "NodeMetadata::is_empty")]
    pub metadata: NodeMetadata,
    /// None while the node is unpopulated
    pub child_count: Option<usize>,
}

/// Result of a full preload walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub containers: usize,
    pub items: usize,
    pub failures: usize,
}

/// A content tree rooted at a single container
pub struct ContainerTree {
    root: Arc<ContentNode>,
}

impl ContainerTree {
    /// Create a tree whose root lists `source`
    pub fn new(
        title: impl Into<String>,
        source: Arc<dyn BackingSource>,
        classifier: Arc<ClassifierRegistry>,
    ) -> Self {
        let title = title.into();
        let now = Utc::now();
        let seed = NodeSeed {
            key: title.clone(),
            title: title.clone(),
            content_type: CONTAINER_CONTENT_TYPE.to_string(),
            created_at: now,
            modified_at: now,
            identifier: None,
            listing: Some(source),
            metadata: NodeMetadata::default(),
        };

        let root = ContentNode::build(
            NodeId::root(&title),
            NodeKind::Container,
            seed,
            Weak::new(),
            classifier,
        );

        Self { root: Arc::new(root) }
    }

    /// Build the tree from the configured filesystem libraries
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let classifier = Arc::new(ClassifierRegistry::standard(&config.media_extensions)?);

        let entries = config
            .libraries
            .iter()
            .map(|library| {
                SourceEntry::new(library.path.to_string_lossy(), &library.title, "library")
                    .with_listing(Arc::new(FilesystemSource::new(library.path.clone())))
            })
            .collect();

        let root_source = Arc::new(StaticSource::new(&config.server_title, entries));
        Ok(Self::new(&config.server_title, root_source, classifier))
    }

    pub fn root(&self) -> &Arc<ContentNode> {
        &self.root
    }

    /// Children of `node`, populating it on first access
    pub async fn children<'a>(
        &self,
        node: &'a Arc<ContentNode>,
    ) -> Result<&'a [Arc<ContentNode>], LibraryError> {
        node.children().await
    }

    /// Walk titles from the root; an empty path resolves to the root
    pub async fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Result<Arc<ContentNode>, LibraryError> {
        let mut current = Arc::clone(&self.root);

        for (depth, segment) in path.iter().enumerate() {
            let next = current
                .children()
                .await?
                .iter()
                .find(|child| child.title() == segment.as_ref())
                .cloned();

            current = next.ok_or_else(|| LibraryError::NotFound {
                path: path[..=depth]
                    .iter()
                    .map(|s| s.as_ref())
                    .collect::<Vec<_>>()
                    .join("/"),
            })?;
        }

        Ok(current)
    }

    /// Find an already-loaded node by id without touching any source
    pub fn find_loaded(&self, id: &NodeId) -> Option<Arc<ContentNode>> {
        let mut queue = VecDeque::from([Arc::clone(&self.root)]);
        while let Some(node) = queue.pop_front() {
            if node.id() == id {
                return Some(node);
            }
            if let Some(children) = node.children.get() {
                queue.extend(children.iter().cloned());
            }
        }
        None
    }

    /// Populate every container breadth-first; failures are logged and skipped
    pub async fn preload(&self) -> PreloadReport {
        info!(root = %self.root.title(), "Preloading lazily cached containers");

        let mut report = PreloadReport::default();
        let mut queue = VecDeque::from([Arc::clone(&self.root)]);

        while let Some(node) = queue.pop_front() {
            if !node.is_container() {
                report.items += 1;
                continue;
            }

            report.containers += 1;
            debug!(container = %node.title_path(), "Loading children");

            match node.children().await {
                Ok(children) => queue.extend(children.iter().cloned()),
                Err(e) => {
                    warn!(error = %e, "Preload skipped container");
                    report.failures += 1;
                }
            }
        }

        info!(
            containers = report.containers,
            items = report.items,
            failures = report.failures,
            "Preload complete"
        );
        report
    }
}
