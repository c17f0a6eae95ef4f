//! Filesystem-backed container source.
//!
//! Lists a single directory. Subdirectories carry their own source so they
//! classify as containers; regular files carry their absolute path as the
//! playback identifier.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use super::source::{BackingSource, SourceEntry};
use crate::domain::NodeMetadata;

/// Lists the entries of one directory
#[derive(Debug, Clone)]
pub struct FilesystemSource {
    dir: PathBuf,
}

impl FilesystemSource {
    /// Create a source for `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory this source lists
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl BackingSource for FilesystemSource {
    fn describe(&self) -> String {
        format!("fs:{}", self.dir.display())
    }

    async fn list_entries(&self) -> Result<Vec<SourceEntry>> {
        let mut dir_entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read directory: {}", self.dir.display()))?;

        let mut found = Vec::new();
        while let Some(entry) = dir_entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            found.push((name, entry.path()));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let mut entries = Vec::with_capacity(found.len());
        for (name, path) in found {
            // Follows symlinks so linked libraries list like real ones
            let metadata = match fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
            let created_at = metadata.created().ok().map(DateTime::<Utc>::from).or(modified_at);
            let key = path.to_string_lossy().to_string();

            let mut source_entry = if metadata.is_dir() {
                SourceEntry::new(key, name, "directory").with_listing(Arc::new(FilesystemSource::new(path.clone())))
            } else if metadata.is_file() {
                let title = Path::new(&name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| name.clone());
                SourceEntry::new(key.clone(), title, "file")
                    .with_identifier(key)
                    .with_file_name(name)
                    .with_metadata(NodeMetadata {
                        source_size: Some(metadata.len()),
                        ..Default::default()
                    })
            } else {
                SourceEntry::new(key, name, "other")
            };

            source_entry.created_at = created_at;
            source_entry.modified_at = modified_at;
            entries.push(source_entry);
        }

        Ok(entries)
    }
}
