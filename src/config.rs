//! Detection configuration.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Thresholds controlling loop detection.
///
/// Values are applied exactly as given; degenerate settings (a zero
/// `max_executions`, an empty window) are not rejected and simply
/// produce the corresponding threshold behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Trailing window over which occurrences are counted, in milliseconds.
    #[serde(rename = "loop_guard_time_window_ms")]
    pub time_window_ms: u64,

    /// Occurrence count within the window at which a stream is flagged.
    #[serde(rename = "loop_guard_max_executions")]
    pub max_executions: usize,

    /// Global toggle.
    #[serde(rename = "loop_guard_enabled")]
    pub enabled: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            time_window_ms: 1_000,
            max_executions: 50,
            enabled: true,
        }
    }
}

/// Partial update merged into the live configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// New window, when set.
    pub time_window_ms: Option<u64>,
    /// New execution ceiling, when set.
    pub max_executions: Option<usize>,
    /// New toggle state, when set.
    pub enabled: Option<bool>,
}

impl DetectionConfig {
    /// Load detection settings from config files and environment variables.
    ///
    /// Priority: env vars → config files → defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            .set_default("loop_guard_enabled", defaults.enabled)
            .and_then(|b| b.set_default("loop_guard_time_window_ms", defaults.time_window_ms))
            .and_then(|b| {
                b.set_default("loop_guard_max_executions", defaults.max_executions as u64)
            })
            .map(|b| {
                b.add_source(File::with_name("config/default").required(false))
                    .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
                    .add_source(File::with_name("config/local").required(false))
                    .add_source(Environment::default().ignore_empty(true))
            });

        let config = match builder {
            Ok(builder) => builder.build(),
            Err(err) => return Self::warn_and_default(err),
        };

        match config.and_then(Config::try_deserialize) {
            Ok(settings) => settings,
            Err(err) => Self::warn_and_default(err),
        }
    }

    /// Merge the set fields of `update` into `self`.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(window) = update.time_window_ms {
            self.time_window_ms = window;
        }
        if let Some(max) = update.max_executions {
            self.max_executions = max;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
    }

    fn warn_and_default(err: ConfigError) -> Self {
        warn!(error = %err, "Failed to load loop guard config, using defaults");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigUpdate, DetectionConfig};

    #[test]
    fn defaults() {
        let config = DetectionConfig::default();
        assert_eq!(config.time_window_ms, 1_000);
        assert_eq!(config.max_executions, 50);
        assert!(config.enabled);
    }

    #[test]
    fn apply_merges_only_set_fields() {
        let mut config = DetectionConfig::default();
        config.apply(ConfigUpdate {
            max_executions: Some(5),
            ..ConfigUpdate::default()
        });
        assert_eq!(config.max_executions, 5);
        assert_eq!(config.time_window_ms, 1_000);
        assert!(config.enabled);
    }

    #[test]
    fn apply_accepts_degenerate_values() {
        let mut config = DetectionConfig::default();
        config.apply(ConfigUpdate {
            time_window_ms: Some(0),
            max_executions: Some(0),
            enabled: None,
        });
        assert_eq!(config.time_window_ms, 0);
        assert_eq!(config.max_executions, 0);
    }
}
