//! Configuration loading and defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::SoundError;

/// Buffer pool and polling parameters shared by every sound source.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamerConfig {
    /// Number of backend buffers kept queued in streaming mode.
    pub slot_count: usize,
    /// Capacity of one streaming buffer in bytes (aligned down to whole frames).
    pub slot_bytes: usize,
    /// Idle poll interval for the refill and sweep tasks, in milliseconds.
    pub idle_poll_ms: u64,
    /// Wait before re-checking when no buffer has been consumed yet, in milliseconds.
    pub backpressure_poll_ms: u64,
}

impl Default for StreamerConfig {
    /// Roughly one display frame of idle latency and 32 × 4 KiB of queued audio.
    fn default() -> Self {
        Self {
            slot_count: 32,
            slot_bytes: 4096,
            idle_poll_ms: 16,
            backpressure_poll_ms: 600,
        }
    }
}

impl StreamerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn backpressure_poll(&self) -> Duration {
        Duration::from_millis(self.backpressure_poll_ms)
    }

    /// Reject settings that would leave a source without a usable buffer.
    pub fn validate(&self) -> Result<(), SoundError> {
        if self.slot_count == 0 {
            return Err(SoundError::InvalidConfig("slot_count must be at least 1".into()));
        }
        if self.slot_bytes == 0 {
            return Err(SoundError::InvalidConfig("slot_bytes must be at least 1".into()));
        }
        Ok(())
    }
}

/// Top-level sound system configuration loaded from TOML.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Output device substring match (default device when unset).
    pub device: Option<String>,
    /// Preferred output sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Buffer pool and polling settings.
    pub streamer: StreamerConfig,
}

impl SystemConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("parse config {:?}", path))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg = toml::from_str::<SystemConfig>(raw)?;
        cfg.streamer.validate()?;
        Ok(cfg)
    }

    /// Device needle with surrounding whitespace removed; blank means default.
    pub fn device_name(&self) -> Option<&str> {
        self.device
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
