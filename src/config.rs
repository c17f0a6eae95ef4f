//! Configuration for hmocast.
//!
//! The config file is the first of:
//! 1. An explicit path (`--config`)
//! 2. The HMOCAST_CONFIG environment variable
//! 3. .hmocast/config.yaml in the current directory or a parent
//! 4. ~/.hmocast/config.yaml
//!
//! Values come from that file over the defaults. HMOCAST_ENCODER then
//! overrides the encoder binary.
//!
//! The result is an immutable snapshot built once at startup and passed to
//! whatever needs it. Relative library paths resolve against the directory
//! holding the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::RelaySettings;
use crate::domain::EncodingProfile;
use crate::library::DEFAULT_MEDIA_PATTERNS;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryFileConfig>,
    #[serde(default)]
    pub relay: Option<RelayFileConfig>,
    #[serde(default)]
    pub encoder: Option<EncoderFileConfig>,
    #[serde(default)]
    pub profile: Option<EncodingProfile>,
    #[serde(default)]
    pub media_extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryFileConfig {
    pub title: String,
    /// Directory (relative to config file)
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayFileConfig {
    pub poll_interval_ms: Option<u64>,
    pub chunk_size: Option<usize>,
    pub stall_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncoderFileConfig {
    pub binary: Option<String>,
    pub checkpoint_interval_ms: Option<u64>,
}

/// A configured top-level library
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryConfig {
    pub title: String,
    pub path: PathBuf,
}

/// Encoder invocation settings
#[derive(Debug, Clone, Serialize)]
pub struct EncoderSettings {
    pub binary: String,
    pub checkpoint_interval: Duration,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            checkpoint_interval: Duration::from_millis(250),
        }
    }
}

/// Resolved configuration snapshot
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Title of the tree root
    pub server_title: String,
    /// Top-level libraries, in display order
    pub libraries: Vec<LibraryConfig>,
    /// Relay polling and stall policy
    pub relay: RelaySettings,
    /// Encoder binary and checkpoint granularity
    pub encoder: EncoderSettings,
    /// Default encoding profile
    pub profile: EncodingProfile,
    /// Glob patterns for files that classify as playable items
    pub media_extensions: Vec<String>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_title: default_server_title(),
            libraries: Vec::new(),
            relay: RelaySettings::default(),
            encoder: EncoderSettings::default(),
            profile: EncodingProfile::default(),
            media_extensions: DEFAULT_MEDIA_PATTERNS.iter().map(|p| p.to_string()).collect(),
            config_file: None,
        }
    }
}

fn default_server_title() -> String {
    "hmocast".to_string()
}

impl Config {
    /// Load configuration from all sources
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var("HMOCAST_CONFIG")
                .ok()
                .map(PathBuf::from)
                .or_else(find_config_file),
        };

        let mut config = match config_file {
            Some(ref path) => {
                let file = load_config_file(path)?;
                // Relative paths resolve against the directory holding .hmocast/
                let base_dir = path
                    .parent()
                    .filter(|p| p.ends_with(".hmocast"))
                    .and_then(|p| p.parent())
                    .or_else(|| path.parent())
                    .unwrap_or(Path::new("."));
                let mut config = Self::from_file(file, base_dir)?;
                config.config_file = Some(path.clone());
                config
            }
            None => Self::default(),
        };

        if let Ok(binary) = std::env::var("HMOCAST_ENCODER") {
            config.encoder.binary = binary;
        }

        config.profile.validate().context("Invalid encoding profile")?;
        Ok(config)
    }

    /// Merge a parsed config file over the defaults
    pub fn from_file(file: ConfigFile, base_dir: &Path) -> Result<Self> {
        let defaults = Self::default();

        let libraries = file
            .libraries
            .into_iter()
            .map(|library| LibraryConfig {
                path: resolve_path(base_dir, &library.path),
                title: library.title,
            })
            .collect();

        let relay_file = file.relay.unwrap_or_default();
        let relay = RelaySettings {
            poll_interval: relay_file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.relay.poll_interval),
            chunk_size: relay_file.chunk_size.unwrap_or(defaults.relay.chunk_size),
            stall_timeout: relay_file.stall_timeout_seconds.map(Duration::from_secs),
        };
        if relay.chunk_size == 0 {
            anyhow::bail!("relay.chunk_size must be greater than zero");
        }

        let encoder_file = file.encoder.unwrap_or_default();
        let encoder = EncoderSettings {
            binary: encoder_file.binary.unwrap_or(defaults.encoder.binary),
            checkpoint_interval: encoder_file
                .checkpoint_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.encoder.checkpoint_interval),
        };

        Ok(Self {
            server_title: file.title.unwrap_or(defaults.server_title),
            libraries,
            relay,
            encoder,
            profile: file.profile.unwrap_or(defaults.profile),
            media_extensions: file.media_extensions.unwrap_or(defaults.media_extensions),
            config_file: None,
        })
    }
}

/// Find config file by searching current directory and parents, then home
fn find_config_file() -> Option<PathBuf> {
    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let config_path = current.join(".hmocast").join("config.yaml");
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }
    }

    dirs::home_dir()
        .map(|home| home.join(".hmocast").join("config.yaml"))
        .filter(|path| path.exists())
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base` or start with `~`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.encoder.binary, "ffmpeg");
        assert_eq!(config.relay.poll_interval, Duration::from_millis(200));
        assert!(config.relay.stall_timeout.is_none());
        assert!(config.media_extensions.iter().any(|p| p == "*.mkv"));
    }

    #[test]
    fn test_config_file_parsing() {
        let file: ConfigFile = serde_yaml::from_str(
            r#"
version: "1"
title: Den
libraries:
  - title: Movies
    path: ./movies
relay:
  poll_interval_ms: 50
  stall_timeout_seconds: 30
encoder:
  binary: /opt/ffmpeg/bin/ffmpeg
profile:
  video_codec: h264
"#,
        )
        .unwrap();

        let config = Config::from_file(file, Path::new("/srv/media")).unwrap();
        assert_eq!(config.server_title, "Den");
        assert_eq!(config.libraries[0].title, "Movies");
        assert_eq!(config.libraries[0].path, PathBuf::from("/srv/media/./movies"));
        assert_eq!(config.relay.poll_interval, Duration::from_millis(50));
        assert_eq!(config.relay.chunk_size, 4096);
        assert_eq!(config.relay.stall_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.encoder.binary, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.profile.video_codec, "h264");
        assert_eq!(config.profile.audio_codec, "ac3");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let file: ConfigFile = serde_yaml::from_str("version: \"1\"\nrelay:\n  chunk_size: 0\n").unwrap();
        assert!(Config::from_file(file, Path::new("/")).is_err());
    }

    #[test]
    fn test_load_explicit_path_resolves_against_project_root() {
        let temp = TempDir::new().unwrap();
        let dot_dir = temp.path().join(".hmocast");
        std::fs::create_dir_all(&dot_dir).unwrap();
        std::fs::create_dir_all(temp.path().join("videos")).unwrap();

        let config_path = dot_dir.join("config.yaml");
        std::fs::write(
            &config_path,
            "version: \"1\"\nlibraries:\n  - title: Videos\n    path: videos\n",
        )
        .unwrap();

        let config = Config::load(Some(&config_path)).unwrap();
        assert_eq!(config.config_file, Some(config_path));
        assert_eq!(
            config.libraries[0].path,
            temp.path().join("videos").canonicalize().unwrap()
        );
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
