//! Declarative encoding profile handed to the encoder.
//!
//! Every field has a default matching the standard set-top MPEG-2 program
//! stream, so a config file only needs to name what it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Parameters for one transcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingProfile {
    /// Output frame rate (default: 29.97)
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Target resolution as "WIDTHxHEIGHT" (default: 1920x1080)
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// Scale to the target width and let the height follow the source aspect
    #[serde(default = "default_preserve_aspect_ratio")]
    pub preserve_aspect_ratio: bool,

    /// Video codec (default: mpeg2video)
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Video bitrate in kbit/s (default: 16384)
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate_kbps: u32,

    /// Video max bitrate in kbit/s (default: 30000)
    #[serde(default = "default_video_max_bitrate")]
    pub video_max_bitrate_kbps: u32,

    /// Encoder rate-control buffer in kbit (default: 4096)
    #[serde(default = "default_buffer_size")]
    pub buffer_size_kbits: u32,

    /// Audio codec (default: ac3)
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate in kbit/s (default: 448)
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,

    /// Audio sample rate in Hz (default: 48000)
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    /// Extra flags passed to the encoder verbatim, after the mapped options
    #[serde(default = "default_passthrough")]
    pub passthrough: Vec<String>,
}

fn default_frame_rate() -> f64 {
    29.97
}
fn default_resolution() -> String {
    "1920x1080".to_string()
}
fn default_preserve_aspect_ratio() -> bool {
    true
}
fn default_video_codec() -> String {
    "mpeg2video".to_string()
}
fn default_video_bitrate() -> u32 {
    16384
}
fn default_video_max_bitrate() -> u32 {
    30000
}
fn default_buffer_size() -> u32 {
    4096
}
fn default_audio_codec() -> String {
    "ac3".to_string()
}
fn default_audio_bitrate() -> u32 {
    448
}
fn default_audio_sample_rate() -> u32 {
    48000
}
fn default_passthrough() -> Vec<String> {
    vec!["-f".to_string(), "vob".to_string()]
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            resolution: default_resolution(),
            preserve_aspect_ratio: default_preserve_aspect_ratio(),
            video_codec: default_video_codec(),
            video_bitrate_kbps: default_video_bitrate(),
            video_max_bitrate_kbps: default_video_max_bitrate(),
            buffer_size_kbits: default_buffer_size(),
            audio_codec: default_audio_codec(),
            audio_bitrate_kbps: default_audio_bitrate(),
            audio_sample_rate: default_audio_sample_rate(),
            passthrough: default_passthrough(),
        }
    }
}

impl EncodingProfile {
    /// Parse the target resolution into (width, height)
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let (w, h) = self
            .resolution
            .split_once(['x', 'X'])
            .with_context(|| format!("Invalid resolution '{}', expected WIDTHxHEIGHT", self.resolution))?;

        let width = w
            .trim()
            .parse()
            .with_context(|| format!("Invalid resolution width '{}'", w))?;
        let height = h
            .trim()
            .parse()
            .with_context(|| format!("Invalid resolution height '{}'", h))?;

        Ok((width, height))
    }

    /// Validate the profile before handing it to an encoder
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate > 0.0) {
            anyhow::bail!("Frame rate must be positive, got {}", self.frame_rate);
        }

        let (width, height) = self.dimensions()?;
        if width == 0 || height == 0 {
            anyhow::bail!("Resolution must be non-zero, got {}", self.resolution);
        }

        if self.video_codec.is_empty() || self.audio_codec.is_empty() {
            anyhow::bail!("Video and audio codecs must be named");
        }

        if self.video_max_bitrate_kbps < self.video_bitrate_kbps {
            anyhow::bail!(
                "Video max bitrate {}k is below the target bitrate {}k",
                self.video_max_bitrate_kbps,
                self.video_bitrate_kbps
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = EncodingProfile::default();
        assert_eq!(profile.video_codec, "mpeg2video");
        assert_eq!(profile.audio_sample_rate, 48000);
        assert_eq!(profile.dimensions().unwrap(), (1920, 1080));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let profile: EncodingProfile = serde_yaml::from_str("video_codec: h264\nresolution: 1280x720\n").unwrap();

        assert_eq!(profile.video_codec, "h264");
        assert_eq!(profile.dimensions().unwrap(), (1280, 720));
        assert_eq!(profile.audio_codec, "ac3");
        assert_eq!(profile.passthrough, vec!["-f", "vob"]);
    }

    #[test]
    fn test_invalid_profiles() {
        let bad_resolution = EncodingProfile {
            resolution: "wide".to_string(),
            ..Default::default()
        };
        assert!(bad_resolution.validate().is_err());

        let bad_bitrate = EncodingProfile {
            video_max_bitrate_kbps: 100,
            ..Default::default()
        };
        assert!(bad_bitrate.validate().is_err());
    }
}
