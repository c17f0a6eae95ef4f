//! Hierarchical media library.
//!
//! Containers list their children from a backing source the first time they
//! are asked, classify each raw entry, and cache the resulting nodes.
//!
//! # Flow
//!
//! ```text
//! children(node) ─► BackingSource::list_entries() ─► ClassifierRegistry::classify()
//!                                                      ├─ Item      ─► child node
//!                                                      ├─ Container ─► child node (lazy)
//!                                                      └─ Unknown   ─► warn, dropped
//! ```

pub mod classify;
pub mod filesystem;
pub mod source;
pub mod tree;

pub use classify::{Classification, ClassifierRegistry, EntryClass, NodeSeed, DEFAULT_MEDIA_PATTERNS};
pub use filesystem::FilesystemSource;
pub use source::{BackingSource, SourceEntry, StaticSource};
pub use tree::{ContainerTree, ContentNode, LibraryError, NodeSummary, PreloadReport};
