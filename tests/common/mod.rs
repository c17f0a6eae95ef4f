//! Scripted encoders shared by the session and relay tests.

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use hmocast::adapters::{EncodeError, EncodeRequest, Encoder};
use hmocast::domain::EncodeProgress;

/// Appends a fixed list of chunks, pausing between them, then optionally fails
pub struct Scripted {
    pub chunks: Vec<Vec<u8>>,
    pub delay: Duration,
    pub fail_with: Option<String>,
}

impl Scripted {
    pub fn new(chunks: &[&[u8]], delay: Duration) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            delay,
            fail_with: None,
        }
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }
}

#[async_trait]
impl Encoder for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn encode(&self, request: EncodeRequest) -> Result<(), EncodeError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&request.output)
            .await
            .map_err(anyhow::Error::from)?;

        let mut written = 0u64;
        for chunk in &self.chunks {
            request.checkpoint.check()?;
            file.write_all(chunk).await.map_err(anyhow::Error::from)?;
            file.flush().await.map_err(anyhow::Error::from)?;
            written += chunk.len() as u64;
            request.report(&EncodeProgress {
                total_size: Some(written),
                ..Default::default()
            });
            sleep(self.delay).await;
        }

        if let Some(ref message) = self.fail_with {
            return Err(EncodeError::Failed(anyhow::anyhow!("{}", message)));
        }
        Ok(())
    }
}

/// Writes a chunk every `delay` until halted
pub struct Endless {
    pub chunk: Vec<u8>,
    pub delay: Duration,
}

#[async_trait]
impl Encoder for Endless {
    fn name(&self) -> &str {
        "endless"
    }

    async fn encode(&self, request: EncodeRequest) -> Result<(), EncodeError> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&request.output)
            .await
            .map_err(anyhow::Error::from)?;

        loop {
            request.checkpoint.check()?;
            file.write_all(&self.chunk).await.map_err(anyhow::Error::from)?;
            file.flush().await.map_err(anyhow::Error::from)?;
            sleep(self.delay).await;
        }
    }
}

/// Stays alive without producing anything until halted
pub struct Silent;

#[async_trait]
impl Encoder for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    async fn encode(&self, request: EncodeRequest) -> Result<(), EncodeError> {
        loop {
            request.checkpoint.check()?;
            sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Panics inside the encode task
pub struct Panicking;

#[async_trait]
impl Encoder for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn encode(&self, _request: EncodeRequest) -> Result<(), EncodeError> {
        panic!("encoder bug");
    }
}
