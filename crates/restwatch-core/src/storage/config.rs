//! TOML-based application configuration.
//!
//! Stores user preferences: work/break cadence, idle detection thresholds,
//! and overlay appearance. Configuration is stored at
//! `~/.config/restwatch/config.toml` and validated before use; a config with
//! an out-of-bounds field is rejected at startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::TimerSettings;

/// Work/break cadence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Work interval length in minutes. Must be at least 1.
    #[serde(default = "default_work_minutes")]
    pub work_minutes: u64,
    /// Break length in seconds. Must be at least 1.
    #[serde(default = "default_break_seconds")]
    pub break_seconds: u64,
}

/// Idle detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Inactivity threshold in minutes before the timer auto-pauses.
    #[serde(default = "default_idle_threshold_minutes")]
    pub threshold_minutes: u64,
    /// How often the idle probe is polled, in seconds.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
}

/// Break overlay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Overlay background opacity, 0.0 to 1.0.
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Ring the terminal bell when a break starts.
    #[serde(default = "default_true")]
    pub bell: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/restwatch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    /// Cleared after the first successful launch.
    #[serde(default = "default_true")]
    pub first_run: bool,
}

// Default functions
fn default_work_minutes() -> u64 {
    20
}
fn default_break_seconds() -> u64 {
    20
}
fn default_idle_threshold_minutes() -> u64 {
    5
}
fn default_poll_seconds() -> u64 {
    10
}
fn default_opacity() -> f64 {
    0.95
}
fn default_true() -> bool {
    true
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            work_minutes: default_work_minutes(),
            break_seconds: default_break_seconds(),
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold_minutes: default_idle_threshold_minutes(),
            poll_seconds: default_poll_seconds(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            opacity: default_opacity(),
            bell: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timer: TimerConfig::default(),
            idle: IdleConfig::default(),
            overlay: OverlayConfig::default(),
            first_run: true,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|_| ConfigError::InvalidValue {
                            key: key.to_string(),
                            message: format!("cannot parse '{value}' as bool"),
                        })?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| ConfigError::InvalidValue {
                                    key: key.to_string(),
                                    message: format!("cannot parse '{value}' as number"),
                                })?
                        } else {
                            return Err(ConfigError::InvalidValue {
                                key: key.to_string(),
                                message: format!("cannot parse '{value}' as number"),
                            });
                        }
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/restwatch"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, or write and return the default when no file exists.
    ///
    /// The loaded config is validated; an out-of-bounds field is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, fails
    /// validation, or the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Check all bounded fields.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timer.work_minutes < 1 {
            return Err(ConfigError::InvalidValue {
                key: "timer.work_minutes".into(),
                message: "work duration must be at least 1 minute".into(),
            });
        }
        if self.timer.break_seconds < 1 {
            return Err(ConfigError::InvalidValue {
                key: "timer.break_seconds".into(),
                message: "break duration must be at least 1 second".into(),
            });
        }
        if self.idle.threshold_minutes < 1 {
            return Err(ConfigError::InvalidValue {
                key: "idle.threshold_minutes".into(),
                message: "idle threshold must be at least 1 minute".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.overlay.opacity) {
            return Err(ConfigError::InvalidValue {
                key: "overlay.opacity".into(),
                message: "overlay opacity must be between 0.0 and 1.0".into(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key, validate the result, and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// the resulting config is out of bounds, or the save fails. The config
    /// is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        updated.validate()?;
        updated.save()?;
        *self = updated;
        Ok(())
    }

    pub fn work_duration(&self) -> Duration {
        Duration::from_secs(self.timer.work_minutes * 60)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(self.timer.break_seconds)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle.threshold_minutes * 60)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle.poll_seconds)
    }

    /// The subset of configuration the scheduler consumes.
    pub fn timer_settings(&self) -> TimerSettings {
        TimerSettings {
            work_duration: self.work_duration(),
            break_duration: self.break_duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.timer.work_minutes, 20);
        assert_eq!(parsed.timer.break_seconds, 20);
        assert_eq!(parsed.idle.threshold_minutes, 5);
        assert!(parsed.first_run);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_work_duration() {
        let mut cfg = Config::default();
        cfg.timer.work_minutes = 0;
        match cfg.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "timer.work_minutes");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_break_duration() {
        let mut cfg = Config::default();
        cfg.timer.break_seconds = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_idle_threshold() {
        let mut cfg = Config::default();
        cfg.idle.threshold_minutes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_opacity() {
        let mut cfg = Config::default();
        cfg.overlay.opacity = 1.5;
        assert!(cfg.validate().is_err());
        cfg.overlay.opacity = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("timer.work_minutes").as_deref(), Some("20"));
        assert_eq!(cfg.get("overlay.bell").as_deref(), Some("true"));
        assert!(cfg.get("timer.missing_key").is_none());
    }

    #[test]
    fn set_json_value_by_path_updates_nested_number() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "timer.work_minutes", "45").unwrap();
        assert_eq!(
            Config::get_json_value_by_path(&json, "timer.work_minutes").unwrap(),
            &serde_json::Value::Number(45.into())
        );
    }

    #[test]
    fn set_json_value_by_path_rejects_unknown_key() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "timer.nonexistent", "1");
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_json_value_by_path_rejects_invalid_type() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "overlay.bell", "not_a_bool");
        assert!(result.is_err());
    }

    #[test]
    fn duration_conversions() {
        let cfg = Config::default();
        assert_eq!(cfg.work_duration(), Duration::from_secs(20 * 60));
        assert_eq!(cfg.break_duration(), Duration::from_secs(20));
        assert_eq!(cfg.idle_threshold(), Duration::from_secs(5 * 60));
        assert_eq!(cfg.poll_interval(), Duration::from_secs(10));
    }
}
