//! ffmpeg encoder using subprocess mode.
//!
//! Spawns the configured binary with `-progress pipe:1` and parses the
//! key=value progress blocks it prints on stdout. The halt flag is polled on
//! a fixed tick; when set, the child is killed.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{EncodeError, EncodeRequest, Encoder};
use crate::domain::{EncodeProgress, EncodingProfile};

/// Lines of stderr kept for failure reports
const STDERR_TAIL_LINES: usize = 20;

/// ffmpeg adapter
pub struct FfmpegEncoder {
    /// Path to the ffmpeg binary (default: "ffmpeg")
    binary_path: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEncoder {
    /// Create an encoder that runs `ffmpeg` from PATH
    pub fn new() -> Self {
        Self::with_binary_path("ffmpeg")
    }

    /// Create an encoder with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build the full argument list for one encode
    pub fn build_args(source: &str, profile: &EncodingProfile, output: &Path) -> Result<Vec<String>> {
        let (width, height) = profile.dimensions()?;

        let mut args: Vec<String> = [
            "-hide_banner", "-nostdin", "-y", "-progress", "pipe:1", "-nostats", "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(source.to_string());

        args.push("-r".to_string());
        args.push(profile.frame_rate.to_string());

        if profile.preserve_aspect_ratio {
            args.push("-vf".to_string());
            args.push(format!("scale={}:-2", width));
        } else {
            args.push("-s".to_string());
            args.push(format!("{}x{}", width, height));
        }

        args.extend([
            "-c:v".to_string(),
            profile.video_codec.clone(),
            "-b:v".to_string(),
            format!("{}k", profile.video_bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", profile.video_max_bitrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", profile.buffer_size_kbits),
            "-c:a".to_string(),
            profile.audio_codec.clone(),
            "-b:a".to_string(),
            format!("{}k", profile.audio_bitrate_kbps),
            "-ar".to_string(),
            profile.audio_sample_rate.to_string(),
        ]);

        args.extend(profile.passthrough.iter().cloned());
        args.push(output.to_string_lossy().to_string());

        Ok(args)
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn encode(&self, request: EncodeRequest) -> Result<(), EncodeError> {
        let args = Self::build_args(&request.source, &request.profile, &request.output)?;
        request.checkpoint.check()?;

        info!(source = %request.source, output = %request.output.display(), "Starting ffmpeg");
        debug!(args = ?args, "ffmpeg arguments");

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary_path))?;

        let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
        let stderr = child.stderr.take().context("ffmpeg stderr not captured")?;
        let stderr_task = tokio::spawn(collect_tail(stderr, STDERR_TAIL_LINES));

        let mut lines = BufReader::new(stdout).lines();
        let mut parser = ProgressParser::default();
        let mut ticker = interval(request.checkpoint.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stdout_open = true;

        let status = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if request.checkpoint.is_halted() {
                        info!(source = %request.source, "Halt requested, killing ffmpeg");
                        let _ = child.kill().await;
                        stderr_task.abort();
                        return Err(EncodeError::Halted);
                    }
                }
                line = lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        if let Some(progress) = parser.feed(&line) {
                            request.report(&progress);
                        }
                    }
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        debug!(error = %e, "ffmpeg progress stream closed");
                        stdout_open = false;
                    }
                },
                status = child.wait(), if !stdout_open => {
                    break status.context("Failed to wait for ffmpeg")?;
                }
            }
        };

        if !status.success() {
            let tail = stderr_task.await.unwrap_or_default();
            let exit_code = status.code().unwrap_or(-1);
            return Err(EncodeError::Failed(anyhow::anyhow!(
                "ffmpeg exited with code {}: {}",
                exit_code,
                tail.trim()
            )));
        }

        info!(source = %request.source, "ffmpeg finished");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .arg("-version")
            .output()
            .await
            .with_context(|| format!("Failed to run {} -version", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg health check failed: {}", stderr);
        }

        Ok(())
    }
}

/// Keep the last `limit` lines of a stream
async fn collect_tail<R: AsyncRead + Unpin>(reader: R, limit: usize) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(limit);

    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == limit {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Accumulates `-progress` key=value lines into reports
#[derive(Debug, Default)]
struct ProgressParser {
    current: EncodeProgress,
}

impl ProgressParser {
    /// Feed one line; returns a report when a block ends
    fn feed(&mut self, line: &str) -> Option<EncodeProgress> {
        let (key, value) = line.split_once('=')?;
        let value = value.trim();
        let known = |v: &str| if v == "N/A" { None } else { Some(v.to_string()) };

        match key.trim() {
            "frame" => self.current.frame = value.parse().ok(),
            "fps" => self.current.fps = value.parse().ok(),
            "out_time_us" => self.current.out_time_us = value.parse().ok(),
            "total_size" => self.current.total_size = value.parse().ok(),
            "speed" => self.current.speed = known(value),
            "progress" => {
                let mut report = std::mem::take(&mut self.current);
                report.finished = value == "end";
                return Some(report);
            }
            _ => {}
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_encoder_creation() {
        let encoder = FfmpegEncoder::new();
        assert_eq!(encoder.name(), "ffmpeg");
        assert_eq!(encoder.binary_path, "ffmpeg");

        let custom = FfmpegEncoder::with_binary_path("/opt/ffmpeg");
        assert_eq!(custom.binary_path, "/opt/ffmpeg");
    }

    #[test]
    fn test_build_args_default_profile() {
        let args = FfmpegEncoder::build_args(
            "/videos/a.mkv",
            &EncodingProfile::default(),
            &PathBuf::from("/tmp/out"),
        )
        .unwrap();

        let joined = args.join(" ");
        assert!(joined.starts_with("-hide_banner -nostdin -y -progress pipe:1 -nostats -i /videos/a.mkv"));
        assert!(joined.contains("-r 29.97"));
        assert!(joined.contains("-vf scale=1920:-2"));
        assert!(joined.contains("-c:v mpeg2video -b:v 16384k -maxrate 30000k -bufsize 4096k"));
        assert!(joined.contains("-c:a ac3 -b:a 448k -ar 48000"));
        assert!(joined.ends_with("-f vob /tmp/out"));
    }

    #[test]
    fn test_build_args_fixed_size() {
        let profile = EncodingProfile {
            preserve_aspect_ratio: false,
            resolution: "720x480".to_string(),
            passthrough: Vec::new(),
            ..Default::default()
        };
        let args = FfmpegEncoder::build_args("in", &profile, Path::new("out")).unwrap();

        let pos = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[pos + 1], "720x480");
        assert!(!args.contains(&"-vf".to_string()));
        assert_eq!(args.last().unwrap(), "out");
    }

    #[test]
    fn test_progress_parser_blocks() {
        let mut parser = ProgressParser::default();

        for line in ["frame=120", "fps=59.5", "total_size=1048576", "out_time_us=4000000", "speed=N/A"] {
            assert!(parser.feed(line).is_none());
        }
        let report = parser.feed("progress=continue").unwrap();
        assert_eq!(report.frame, Some(120));
        assert_eq!(report.fps, Some(59.5));
        assert_eq!(report.total_size, Some(1_048_576));
        assert_eq!(report.out_time_us, Some(4_000_000));
        assert_eq!(report.speed, None);
        assert!(!report.finished);

        parser.feed("speed=1.5x");
        let last = parser.feed("progress=end").unwrap();
        assert_eq!(last.speed.as_deref(), Some("1.5x"));
        assert_eq!(last.frame, None);
        assert!(last.finished);
    }

    #[test]
    fn test_progress_parser_ignores_noise() {
        let mut parser = ProgressParser::default();
        assert!(parser.feed("not a progress line").is_none());
        assert!(parser.feed("stream_0_0_q=2.0").is_none());
    }

    #[cfg(unix)]
    mod subprocess {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::{Arc, Mutex};
        use std::time::Duration;

        use tempfile::TempDir;
        use tokio_util::sync::CancellationToken;

        use crate::adapters::{Checkpoint, EncodeError, EncodeRequest, Encoder, FfmpegEncoder, ProgressObserver};
        use crate::domain::{EncodeProgress, EncodingProfile};

        /// Write an executable stand-in for the ffmpeg binary
        fn fake_ffmpeg(dir: &TempDir, body: &str) -> String {
            let path = dir.path().join("ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().to_string()
        }

        fn request(dir: &TempDir, token: CancellationToken, observer: ProgressObserver) -> EncodeRequest {
            EncodeRequest {
                source: "/videos/a.mkv".to_string(),
                profile: EncodingProfile::default(),
                output: dir.path().join("out.mpg"),
                progress: observer,
                checkpoint: Checkpoint::new(token, Duration::from_millis(10)),
            }
        }

        fn recorder() -> (Arc<Mutex<Vec<EncodeProgress>>>, ProgressObserver) {
            let reports: Arc<Mutex<Vec<EncodeProgress>>> = Arc::default();
            let sink = Arc::clone(&reports);
            let observer: ProgressObserver = Arc::new(move |p: &EncodeProgress| sink.lock().unwrap().push(p.clone()));
            (reports, observer)
        }

        #[tokio::test]
        async fn test_progress_blocks_reach_observer() {
            let dir = TempDir::new().unwrap();
            let binary = fake_ffmpeg(
                &dir,
                "printf 'frame=10\\nout_time_us=1000000\\nprogress=continue\\nframe=20\\nprogress=end\\n'\nexit 0",
            );
            let (reports, observer) = recorder();

            let encoder = FfmpegEncoder::with_binary_path(binary);
            let result = encoder.encode(request(&dir, CancellationToken::new(), observer)).await;
            assert!(result.is_ok(), "{:?}", result);

            let reports = reports.lock().unwrap();
            assert_eq!(reports.len(), 2);
            assert_eq!(reports[0].frame, Some(10));
            assert_eq!(reports[0].out_time_us, Some(1_000_000));
            assert!(!reports[0].finished);
            assert_eq!(reports[1].frame, Some(20));
            assert!(reports[1].finished);
        }

        #[tokio::test]
        async fn test_nonzero_exit_reports_stderr_tail() {
            let dir = TempDir::new().unwrap();
            let binary = fake_ffmpeg(&dir, "echo 'Unknown encoder mpeg2video' >&2\nexit 1");
            let (_, observer) = recorder();

            let encoder = FfmpegEncoder::with_binary_path(binary);
            match encoder.encode(request(&dir, CancellationToken::new(), observer)).await {
                Err(EncodeError::Failed(e)) => {
                    let message = e.to_string();
                    assert!(message.contains("exited with code 1"), "{}", message);
                    assert!(message.contains("Unknown encoder mpeg2video"), "{}", message);
                }
                other => panic!("Expected Failed, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_halt_kills_running_child() {
            let dir = TempDir::new().unwrap();
            let binary = fake_ffmpeg(&dir, "exec sleep 30");
            let (_, observer) = recorder();
            let token = CancellationToken::new();

            let halt = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                halt.cancel();
            });

            let encoder = FfmpegEncoder::with_binary_path(binary);
            let result = tokio::time::timeout(
                Duration::from_secs(5),
                encoder.encode(request(&dir, token, observer)),
            )
            .await
            .expect("halt did not stop the encoder");
            assert!(matches!(result, Err(EncodeError::Halted)));
        }

        #[tokio::test]
        async fn test_health_check_runs_binary() {
            let dir = TempDir::new().unwrap();
            let ok = FfmpegEncoder::with_binary_path(fake_ffmpeg(&dir, "echo 'ffmpeg version 6.0'"));
            assert!(ok.health_check().await.is_ok());

            let missing = FfmpegEncoder::with_binary_path(dir.path().join("nope").to_string_lossy().to_string());
            assert!(missing.health_check().await.is_err());
        }
    }
}
