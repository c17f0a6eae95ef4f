//! Command-line interface for hmocast.
//!
//! Provides commands for browsing the library tree, streaming an item
//! through the transcoder, and inspecting configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWrite;

use crate::adapters::ProgressObserver;
use crate::config::Config;
use crate::core::Streamer;
use crate::domain::EncodeProgress;
use crate::library::ContainerTree;

/// hmocast - stream a lazily loaded media library through a transcoder
#[derive(Parser, Debug)]
#[command(name = "hmocast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Load configuration from the given file (overrides HMOCAST_CONFIG)
    #[arg(short = 'f', long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Load every container listing before running the command
    #[arg(short = 'r', long, global = true)]
    pub preload: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the children of a container
    Browse {
        /// Titles from the root to the container (empty for the root)
        path: Vec<String>,

        /// Print renderer summaries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transcode an item into a file or stdout
    Stream {
        /// Titles from the root to the item
        #[arg(required = true)]
        path: Vec<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show resolved configuration
    Config,

    /// Check that the encoder binary runs
    Check,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        let tree = ContainerTree::from_config(&config)?;

        if self.preload {
            let report = tree.preload().await;
            eprintln!(
                "[Preloaded {} containers, {} items, {} failures]",
                report.containers, report.items, report.failures
            );
        }

        match self.command {
            Commands::Browse { path, json } => browse(&tree, &path, json).await,
            Commands::Stream { path, output } => stream(&config, &tree, &path, output).await,
            Commands::Config => show_config(&config),
            Commands::Check => check_encoder(&config).await,
        }
    }
}

/// List the children of the node at `path`
async fn browse(tree: &ContainerTree, path: &[String], json: bool) -> Result<()> {
    let node = tree.resolve(path).await?;
    let children = node.children().await?;

    if json {
        let summaries: Vec<_> = children.iter().map(|c| c.summary()).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if children.is_empty() {
        println!("{} is empty", node.title_path());
        return Ok(());
    }

    println!(
        "{:<10} {:<17} {:<40} {:<24} {}",
        "KIND", "ID", "TITLE", "CONTENT TYPE", "MODIFIED"
    );
    println!("{}", "-".repeat(110));

    for child in children {
        println!(
            "{:<10} {:<17} {:<40} {:<24} {}",
            child.kind(),
            child.id(),
            truncate(child.title(), 40),
            child.content_type(),
            child.modified_at().format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

/// Transcode the item at `path`
async fn stream(config: &Config, tree: &ContainerTree, path: &[String], output: Option<PathBuf>) -> Result<()> {
    let node = tree.resolve(path).await?;
    // Reject containers before touching the output file
    Streamer::playable_identifier(&node)?;
    let streamer = Streamer::from_config(config);

    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match output {
        Some(ref path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let observer: ProgressObserver = Arc::new(|progress: &EncodeProgress| {
        if let Some(out_us) = progress.out_time_us {
            eprint!("\r[{:>8.1}s encoded]", out_us as f64 / 1_000_000.0);
        }
    });

    let outcome = streamer.stream(&node, &mut sink, Some(observer)).await?;

    eprintln!(
        "\n[{} bytes forwarded, session {}]",
        outcome.bytes_forwarded, outcome.status
    );
    Ok(())
}

/// Show resolved configuration
fn show_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Run the encoder health check
async fn check_encoder(config: &Config) -> Result<()> {
    let streamer = Streamer::from_config(config);
    streamer.encoder().health_check().await?;
    println!("{} ({}) is available", streamer.encoder().name(), config.encoder.binary);
    Ok(())
}

/// Truncate a string to max length
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
