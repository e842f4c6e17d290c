use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::command::{DecodeProfile, PlayArgs};
use crate::input::DEFAULT_CHUNK_SIZE;

/// Player settings read from `--config`.
///
/// ```yaml
/// throttle: 5
/// runtime_class: lc-only
/// volume: 1.0
/// chunk_size: 65536
/// debug: false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    pub throttle: usize,
    pub runtime_class: DecodeProfile,
    pub volume: f32,
    pub chunk_size: usize,
    pub timestamp_base: i64,
    pub debug: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            throttle: flvaac::process::dispatch::DEFAULT_THROTTLE,
            // symphonia only decodes LC.
            runtime_class: DecodeProfile::LcOnly,
            volume: 1.0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timestamp_base: 0,
            debug: false,
        }
    }
}

impl PlayerConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// File settings (or defaults) overridden by explicit flags.
    pub fn resolve(args: &PlayArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(throttle) = args.throttle {
            config.throttle = throttle;
        }
        if let Some(profile) = args.runtime_class {
            config.runtime_class = profile;
        }
        if let Some(volume) = args.volume {
            config.volume = volume;
        }
        if let Some(chunk_size) = args.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(base) = args.timestamp_base {
            config.timestamp_base = base;
        }
        config.debug |= args.debug;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.throttle == 0 {
            bail!("throttle must be at least 1");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.volume) {
            bail!("volume must be within [0, 1], got {}", self.volume);
        }
        Ok(())
    }
}
