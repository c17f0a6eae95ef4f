//! Entry classification.
//!
//! Raw source entries are mapped onto a closed set of variants by a
//! registry of predicates. Rules are tried in registration order and the
//! first match wins; an entry no rule claims is `Unknown`.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};

use super::source::{BackingSource, SourceEntry};
use crate::domain::{NodeKind, NodeMetadata, CONTAINER_CONTENT_TYPE, ITEM_CONTENT_TYPE};

/// Media file patterns used when no configuration overrides them
pub const DEFAULT_MEDIA_PATTERNS: &[&str] = &[
    "*.mp4", "*.mkv", "*.avi", "*.mpg", "*.mpeg", "*.mov", "*.m4v", "*.ts", "*.wmv",
];

/// Everything needed to build a content node from a classified entry
#[derive(Clone)]
pub struct NodeSeed {
    pub key: String,
    pub title: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub identifier: Option<String>,
    pub listing: Option<Arc<dyn BackingSource>>,
    pub metadata: NodeMetadata,
}

impl NodeSeed {
    /// Build a seed with the default content type for `kind`
    pub fn from_entry(entry: SourceEntry, kind: NodeKind) -> Self {
        let now = Utc::now();
        let default_type = match kind {
            NodeKind::Item => ITEM_CONTENT_TYPE,
            NodeKind::Container => CONTAINER_CONTENT_TYPE,
        };
        let created_at = entry.created_at.unwrap_or(now);

        Self {
            key: entry.key,
            title: entry.title,
            content_type: entry.content_type.unwrap_or_else(|| default_type.to_string()),
            created_at,
            modified_at: entry.modified_at.unwrap_or(created_at),
            identifier: entry.identifier,
            listing: entry.listing,
            metadata: entry.metadata,
        }
    }
}

/// Coarse classification tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    Item,
    Container,
    Unknown,
}

/// Result of classifying one entry
pub enum Classification {
    Item(NodeSeed),
    Container(NodeSeed),
    Unknown(SourceEntry),
}

impl Classification {
    pub fn class(&self) -> EntryClass {
        match self {
            Classification::Item(_) => EntryClass::Item,
            Classification::Container(_) => EntryClass::Container,
            Classification::Unknown(_) => EntryClass::Unknown,
        }
    }
}

type Predicate = Box<dyn Fn(&SourceEntry) -> bool + Send + Sync>;
type Constructor = Box<dyn Fn(SourceEntry) -> NodeSeed + Send + Sync>;

struct Rule {
    name: String,
    target: NodeKind,
    predicate: Predicate,
    construct: Constructor,
}

/// Ordered predicate table mapping entries to node variants
#[derive(Default)]
pub struct ClassifierRegistry {
    rules: Vec<Rule>,
}

impl ClassifierRegistry {
    /// Create an empty registry (classifies everything as Unknown)
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Standard rules: listable entries, media files, then catalog playables
    pub fn standard<S: AsRef<str>>(media_patterns: &[S]) -> Result<Self> {
        let patterns = media_patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).with_context(|| format!("Invalid media pattern: {}", p.as_ref()))
            })
            .collect::<Result<Vec<_>>>()?;

        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };

        let mut registry = Self::new();
        registry
            .register("listing", NodeKind::Container, |e| e.listing.is_some())
            .register("media-file", NodeKind::Item, move |e| {
                e.identifier.is_some()
                    && e
                        .file_name
                        .as_deref()
                        .map(|name| patterns.iter().any(|p| p.matches_with(name, options)))
                        .unwrap_or(false)
            })
            .register("playable", NodeKind::Item, |e| {
                e.identifier.is_some() && e.file_name.is_none()
            });

        Ok(registry)
    }

    /// Register a rule that builds the default node for `target`
    pub fn register<P>(&mut self, name: impl Into<String>, target: NodeKind, predicate: P) -> &mut Self
    where
        P: Fn(&SourceEntry) -> bool + Send + Sync + 'static,
    {
        self.register_with(name, target, predicate, move |entry| NodeSeed::from_entry(entry, target))
    }

    /// Register a rule with a custom node constructor
    pub fn register_with<P, C>(
        &mut self,
        name: impl Into<String>,
        target: NodeKind,
        predicate: P,
        construct: C,
    ) -> &mut Self
    where
        P: Fn(&SourceEntry) -> bool + Send + Sync + 'static,
        C: Fn(SourceEntry) -> NodeSeed + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            name: name.into(),
            target,
            predicate: Box::new(predicate),
            construct: Box::new(construct),
        });
        self
    }

    /// Rule names in priority order
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Classify an entry; total over all inputs
    pub fn classify(&self, entry: SourceEntry) -> Classification {
        match self.rules.iter().find(|rule| (rule.predicate)(&entry)) {
            Some(rule) => {
                let seed = (rule.construct)(entry);
                match rule.target {
                    NodeKind::Item => Classification::Item(seed),
                    NodeKind::Container => Classification::Container(seed),
                }
            }
            None => Classification::Unknown(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::source::StaticSource;

    fn standard() -> ClassifierRegistry {
        ClassifierRegistry::standard(DEFAULT_MEDIA_PATTERNS).unwrap()
    }

    #[test]
    fn test_listing_wins_over_identifier() {
        let entry = SourceEntry::new("show", "Show", "show")
            .with_identifier("plex://show")
            .with_listing(Arc::new(StaticSource::new("episodes", Vec::new())));

        assert_eq!(standard().classify(entry).class(), EntryClass::Container);
    }

    #[test]
    fn test_media_file_match_is_case_insensitive() {
        let entry = SourceEntry::new("/v/A.MKV", "A", "file")
            .with_identifier("/v/A.MKV")
            .with_file_name("A.MKV");

        match standard().classify(entry) {
            Classification::Item(seed) => {
                assert_eq!(seed.content_type, ITEM_CONTENT_TYPE);
                assert_eq!(seed.identifier.as_deref(), Some("/v/A.MKV"));
            }
            _ => panic!("expected item"),
        }
    }

    #[test]
    fn test_non_media_file_is_unknown() {
        let entry = SourceEntry::new("/v/notes.txt", "notes", "file")
            .with_identifier("/v/notes.txt")
            .with_file_name("notes.txt");

        assert_eq!(standard().classify(entry).class(), EntryClass::Unknown);
    }

    #[test]
    fn test_catalog_playable_without_file_name() {
        let entry = SourceEntry::new("/library/metadata/7", "Alien", "movie").with_identifier("/library/metadata/7");
        assert_eq!(standard().classify(entry).class(), EntryClass::Item);
    }

    #[test]
    fn test_first_registered_rule_wins() {
        let mut registry = ClassifierRegistry::new();
        registry
            .register_with(
                "episodes",
                NodeKind::Item,
                |e| e.kind == "episode",
                |e| {
                    let mut seed = NodeSeed::from_entry(e, NodeKind::Item);
                    seed.content_type = "video/x-episode".to_string();
                    seed
                },
            )
            .register("anything", NodeKind::Container, |_| true);

        assert_eq!(registry.rule_names(), vec!["episodes", "anything"]);

        match registry.classify(SourceEntry::new("e1", "Pilot", "episode")) {
            Classification::Item(seed) => assert_eq!(seed.content_type, "video/x-episode"),
            _ => panic!("expected item"),
        }
        assert_eq!(
            registry.classify(SourceEntry::new("x", "X", "other")).class(),
            EntryClass::Container
        );
    }

    #[test]
    fn test_empty_registry_is_total() {
        let registry = ClassifierRegistry::new();
        assert_eq!(
            registry.classify(SourceEntry::new("x", "X", "anything")).class(),
            EntryClass::Unknown
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(ClassifierRegistry::standard(&["[unclosed"]).is_err());
    }
}
