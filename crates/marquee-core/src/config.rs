//! Player configuration
//!
//! Engine options are serialized under the adaptive engine's own option
//! names so a browser host can pass them through unchanged.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Adaptive engine construction options (bounded buffering, bounded retry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Maximum buffered bytes
    pub max_buffer_size: u64,
    /// Target buffered duration (seconds)
    pub max_buffer_length: f64,
    /// Buffered duration ceiling used while recovering (seconds)
    pub max_max_buffer_length: f64,
    /// Largest gap between buffered ranges that is jumped over (seconds)
    pub max_buffer_hole: f64,
    /// Fragment load timeout (milliseconds)
    #[serde(rename = "fragLoadingTimeOut")]
    pub frag_loading_timeout_ms: u64,
    /// Fragment load retries before the error turns fatal
    pub frag_loading_max_retry: u32,
    /// Cap of the growing retry delay (milliseconds)
    #[serde(rename = "fragLoadingMaxRetryTimeout")]
    pub frag_loading_max_retry_timeout_ms: u64,
    /// Initial level index, -1 lets the engine decide
    pub start_level: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 60 * 1000 * 1000,
            max_buffer_length: 30.0,
            max_max_buffer_length: 60.0,
            max_buffer_hole: 0.5,
            frag_loading_timeout_ms: 20_000,
            frag_loading_max_retry: 3,
            frag_loading_max_retry_timeout_ms: 64_000,
            start_level: crate::AUTO_LEVEL,
        }
    }
}

/// Suppression windows, settling delays and persistence cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingConfig {
    /// How long a restored rendition switch is not treated as a user pick
    pub programmatic_change_window_ms: u64,
    /// How long level switches are ignored after a fullscreen change
    pub fullscreen_transition_window_ms: u64,
    /// Delay between media attach and the resume seek
    pub seek_settle_ms: u64,
    /// Delay before checking drift after the page becomes visible
    pub visibility_check_delay_ms: u64,
    /// Media seconds between periodic position writes
    pub position_persist_interval_secs: f64,
    /// Allowed distance between live and saved position after regaining visibility
    pub drift_tolerance_secs: f64,
}

impl TimingConfig {
    pub fn programmatic_change_window(&self) -> Duration {
        Duration::from_millis(self.programmatic_change_window_ms)
    }

    pub fn fullscreen_transition_window(&self) -> Duration {
        Duration::from_millis(self.fullscreen_transition_window_ms)
    }

    pub fn seek_settle(&self) -> Duration {
        Duration::from_millis(self.seek_settle_ms)
    }

    pub fn visibility_check_delay(&self) -> Duration {
        Duration::from_millis(self.visibility_check_delay_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            programmatic_change_window_ms: 100,
            fullscreen_transition_window_ms: 300,
            seek_settle_ms: 200,
            visibility_check_delay_ms: 100,
            position_persist_interval_secs: 5.0,
            drift_tolerance_secs: 0.5,
        }
    }
}

/// Path segments appended to `{base}/movies/{id}/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceLayout {
    pub manifest: Vec<String>,
    pub fallback: Vec<String>,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            manifest: vec!["transcoded".to_string(), "master-manifest".to_string()],
            fallback: vec!["video-file".to_string()],
        }
    }
}

/// Player configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerConfig {
    pub engine: EngineConfig,
    pub timing: TimingConfig,
    pub sources: SourceLayout,
}

impl PlayerConfig {
    /// Parse and validate a JSON configuration; absent fields keep defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations that would wedge or disable the state machine
    pub fn validate(&self) -> Result<()> {
        let timing = &self.timing;
        if timing.programmatic_change_window_ms == 0 {
            return Err(Error::InvalidConfig(
                "programmaticChangeWindowMs must be positive".into(),
            ));
        }
        if timing.fullscreen_transition_window_ms == 0 {
            return Err(Error::InvalidConfig(
                "fullscreenTransitionWindowMs must be positive".into(),
            ));
        }
        if !(timing.position_persist_interval_secs > 0.0) {
            return Err(Error::InvalidConfig(
                "positionPersistIntervalSecs must be positive".into(),
            ));
        }
        if !(timing.drift_tolerance_secs >= 0.0) {
            return Err(Error::InvalidConfig(
                "driftToleranceSecs must not be negative".into(),
            ));
        }

        let engine = &self.engine;
        if engine.max_max_buffer_length < engine.max_buffer_length {
            return Err(Error::InvalidConfig(format!(
                "maxMaxBufferLength ({}) is below maxBufferLength ({})",
                engine.max_max_buffer_length, engine.max_buffer_length
            )));
        }
        if engine.max_buffer_size == 0 {
            return Err(Error::InvalidConfig("maxBufferSize must be positive".into()));
        }

        if self.sources.manifest.is_empty() || self.sources.fallback.is_empty() {
            return Err(Error::InvalidConfig("source paths must not be empty".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.engine.max_buffer_size, 60_000_000);
        assert_eq!(config.engine.max_buffer_length, 30.0);
        assert_eq!(config.engine.max_max_buffer_length, 60.0);
        assert_eq!(config.engine.frag_loading_max_retry, 3);
        assert_eq!(config.timing.programmatic_change_window(), Duration::from_millis(100));
        assert_eq!(config.timing.seek_settle(), Duration::from_millis(200));
        assert_eq!(config.timing.position_persist_interval_secs, 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_options_use_engine_names() {
        let json = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(json["maxBufferSize"], 60_000_000);
        assert_eq!(json["fragLoadingTimeOut"], 20_000);
        assert_eq!(json["fragLoadingMaxRetryTimeout"], 64_000);
        assert_eq!(json["startLevel"], -1);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json_str(r#"{"timing":{"seekSettleMs":350}}"#).unwrap();
        assert_eq!(config.timing.seek_settle_ms, 350);
        assert_eq!(config.timing.fullscreen_transition_window_ms, 300);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let result = PlayerConfig::from_json_str(r#"{"timing":{"programmaticChangeWindowMs":0}}"#);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_buffer_ceiling() {
        let mut config = PlayerConfig::default();
        config.engine.max_max_buffer_length = 10.0;
        assert!(config.validate().is_err());
    }
}
