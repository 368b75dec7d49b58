//! Configuration
//!
//! Every section has working defaults, so an empty JSON object (or no file at
//! all) is a valid configuration.

use crate::error::{HarmonixError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the generative-text API key.
pub const ASSIST_KEY_ENV: &str = "HARMONIX_ASSIST_KEY";

/// Bundled demo track used whenever nothing better is playable.
pub const DEMO_TRACK_URL: &str =
    "https://cdn.pixabay.com/download/audio/2022/05/27/audio_1808fbf07a.mp3?filename=lofi-study-112191.mp3";

/// Playback engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Context sample rate in Hz
    pub sample_rate: u32,
    /// Frames per render quantum
    pub render_quantum: usize,
    /// Media time between `TimeUpdate` events, in milliseconds
    pub time_update_ms: u64,
    /// Period of the background motion ticker, in milliseconds
    pub background_interval_ms: u64,
}

impl EngineConfig {
    /// Small render quantum for interactive use
    /// Quantum = 128 frames ≈ 2.9ms @ 44.1kHz
    pub fn low_latency(sample_rate: u32) -> Self {
        EngineConfig {
            sample_rate,
            render_quantum: 128,
            time_update_ms: 250,
            background_interval_ms: 500,
        }
    }

    /// Larger quantum for offline rendering
    /// Quantum = 1024 frames ≈ 23ms @ 44.1kHz
    pub fn offline(sample_rate: u32) -> Self {
        EngineConfig {
            render_quantum: 1024,
            ..Self::low_latency(sample_rate)
        }
    }

    /// Duration of one render quantum in milliseconds.
    pub fn quantum_ms(&self) -> f32 {
        (self.render_quantum as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Background ticker period.
    pub fn background_interval(&self) -> Duration {
        Duration::from_millis(self.background_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(HarmonixError::ConfigError(format!(
                "sample rate {} Hz out of range",
                self.sample_rate
            )));
        }
        if self.render_quantum == 0 || self.render_quantum > 8192 {
            return Err(HarmonixError::ConfigError(format!(
                "render quantum {} out of range",
                self.render_quantum
            )));
        }
        if self.background_interval_ms == 0 {
            return Err(HarmonixError::ConfigError(
                "background interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::low_latency(44_100)
    }
}

/// Track resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base URLs of the primary catalog mirrors, raced against each other
    pub primary_mirrors: Vec<String>,
    /// Search endpoint of the secondary catalog
    pub secondary_url: String,
    /// Deadline per mirror request, in milliseconds
    pub mirror_timeout_ms: u64,
    /// Deadline for the secondary catalog, in milliseconds
    pub secondary_timeout_ms: u64,
    /// Asset used by placeholder descriptors
    pub demo_track_url: String,
    /// Result count when the caller does not specify one
    pub default_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            primary_mirrors: vec![
                "https://saavn.dev/api".into(),
                "https://jiosaavn-api-privatecvc2.vercel.app".into(),
                "https://saavn.me".into(),
            ],
            secondary_url: "https://itunes.apple.com/search".into(),
            mirror_timeout_ms: 5_000,
            secondary_timeout_ms: 8_000,
            demo_track_url: DEMO_TRACK_URL.into(),
            default_limit: 20,
        }
    }
}

impl ResolverConfig {
    /// Per-mirror deadline.
    pub fn mirror_timeout(&self) -> Duration {
        Duration::from_millis(self.mirror_timeout_ms)
    }

    /// Secondary catalog deadline.
    pub fn secondary_timeout(&self) -> Duration {
        Duration::from_millis(self.secondary_timeout_ms)
    }
}

/// Generative-text service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// API root
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// API key; without one every request falls back immediately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request deadline in milliseconds
    pub timeout_ms: u64,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-3-flash-preview".into(),
            api_key: None,
            timeout_ms: 15_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine section
    pub engine: EngineConfig,
    /// Resolver section
    pub resolver: ResolverConfig,
    /// Assistant section
    pub assist: AssistConfig,
}

impl AppConfig {
    /// Parse from a JSON string and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)
            .map_err(|e| HarmonixError::ConfigError(format!("invalid config JSON: {e}")))?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Apply environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(key) = std::env::var(ASSIST_KEY_ENV) {
            if !key.trim().is_empty() {
                self.assist.api_key = Some(key);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_quantum_duration() {
        let config = EngineConfig::low_latency(44_100);
        let ms = config.quantum_ms();
        assert!(ms > 2.8 && ms < 3.0);
        assert_eq!(EngineConfig::offline(44_100).render_quantum, 1024);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.resolver.primary_mirrors.len(), 3);
        assert_eq!(config.resolver.mirror_timeout_ms, 5_000);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config =
            AppConfig::from_json(r#"{"engine": {"sample_rate": 48000}, "assist": {"api_key": "k"}}"#)
                .unwrap();
        assert_eq!(config.engine.sample_rate, 48_000);
        assert_eq!(config.engine.render_quantum, 128);
        assert_eq!(config.assist.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AppConfig::from_json(r#"{"engine": {"render_quantum": 0}}"#).unwrap_err();
        assert!(matches!(err, HarmonixError::ConfigError(_)));
        assert!(AppConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harmonix.json");
        std::fs::write(&path, r#"{"resolver": {"default_limit": 5}}"#).unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.resolver.default_limit, 5);
    }
}
