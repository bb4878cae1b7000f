//! Engine configuration (`jitter.toml`)
//!
//! Every field has a default, so an empty file or a missing one yields a
//! working 48 kHz stereo 16-bit regulator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{BitDepth, FrameLayout};
use crate::constants::{DEFAULT_CHANNELS, DEFAULT_FRAMES_PER_PERIOD, DEFAULT_SAMPLE_RATE};
use crate::error::{ConfigError, Result};
use crate::jitter::{ClassicConfig, RegulatorConfig, StrategyKind};

/// File name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "jitter.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub jitter: JitterConfig,
}

/// Stream format shared by both ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frames_per_period: usize,
    pub channels: usize,
    pub bit_depth: BitDepth,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frames_per_period: DEFAULT_FRAMES_PER_PERIOD,
            channels: DEFAULT_CHANNELS,
            bit_depth: BitDepth::Bit16,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.frames_per_period == 0 {
            return Err(ConfigError::ZeroFramesPerPeriod);
        }
        if self.channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        Ok(())
    }

    /// Slot geometry for this format
    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.frames_per_period, self.channels, self.bit_depth)
    }

    /// Duration of one frame period
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_period as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Strategy choice plus the settings of each strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    pub strategy: StrategyKind,
    pub regulator: RegulatorConfig,
    pub classic: ClassicConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), strategy = config.jitter.strategy.name(), "Loaded config");
        Ok(config)
    }

    /// Load `jitter.toml` from the platform config dir, falling back to defaults
    ///
    /// A file that exists but fails to parse or validate is an error; a
    /// missing file is not.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            None => {
                warn!("No platform config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Where `load_or_default` looks
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "lan-audio", "lan-audio-regulator")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.audio.validate()?;
        match self.jitter.strategy {
            StrategyKind::Regulator => self.jitter.regulator.validate(),
            StrategyKind::Classic => self.jitter.classic.validate(),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::jitter::LevelCorrection;
    use crate::plc::ConcealmentProfile;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.frames_per_period, 128);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.audio.bit_depth, BitDepth::Bit16);
        assert_eq!(config.jitter.strategy, StrategyKind::Regulator);
        assert_eq!(config.jitter.regulator.pool_size, 128);
        assert_eq!(config.jitter.regulator.lookback_window, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
[audio]
frames_per_period = 64
bit_depth = 24

[jitter]
strategy = "classic"

[jitter.regulator]
profile = "legacy"

[jitter.classic]
auto_queue = true
correction = "tight"
broadcast_queue_length = 8
"#;
        let config = EngineConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.audio.frames_per_period, 64);
        assert_eq!(config.audio.bit_depth, BitDepth::Bit24);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.jitter.strategy, StrategyKind::Classic);
        assert_eq!(config.jitter.regulator.profile, ConcealmentProfile::Legacy);
        assert!(config.jitter.classic.auto_queue);
        assert_eq!(config.jitter.classic.correction, LevelCorrection::Tight);
        assert_eq!(config.jitter.classic.broadcast_queue_length, 8);
    }

    #[test]
    fn test_config_rejects_bad_bit_depth() {
        let err = EngineConfig::from_toml_str("[audio]\nbit_depth = 12\n").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        let err = EngineConfig::from_toml_str("[audio]\nchannels = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ZeroChannels)));

        let err =
            EngineConfig::from_toml_str("[jitter.regulator]\npool_size = 96\n").unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::PoolSizeNotPowerOfTwo(96))
        ));
    }

    #[test]
    fn test_config_serialize_roundtrip() {
        let mut config = EngineConfig::default();
        config.jitter.regulator.auto_tolerance = true;
        config.jitter.regulator.history_depth = Some(4);

        let toml_str = config.to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_period_duration() {
        let audio = AudioConfig::default();
        let period = audio.period();
        assert!((period.as_secs_f64() - 128.0 / 48000.0).abs() < 1e-9);
        assert_eq!(audio.layout().slot_bytes(), 128 * 2 * 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/jitter.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
