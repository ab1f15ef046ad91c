//! TOML-based application configuration.
//!
//! Holds everything that is not a user-facing intervention setting:
//! - Web sync endpoint, user id and interval
//! - The desktop notifier program
//! - Default focus-session length
//! - Where blocking rules are written for the extension
//! - How a skipped intervention's completion rate is computed
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::gate::CompletionRatePolicy;

/// Web sync configuration. Sync is skipped until `endpoint` and `user_id`
/// are set and an API key is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_sync_interval")]
    pub interval_minutes: u64,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Desktop notifier program used as the rich channel. Empty disables it.
    #[serde(default = "default_notify_command")]
    pub command: String,
    #[serde(default = "default_icon")]
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusConfig {
    #[serde(default = "default_focus_minutes")]
    pub default_minutes: u64,
}

/// Blocking-rule output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// File the installed rule set is written to. Defaults to
    /// `<data_dir>/rules.json`.
    #[serde(default)]
    pub rules_path: Option<String>,
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RatePolicyKind {
    #[default]
    ElapsedRatio,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub completion_rate_policy: RatePolicyKind,
    /// Rate recorded for every skip under the `fixed` policy.
    #[serde(default = "default_fixed_skip_rate")]
    pub fixed_skip_rate: f64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub gate: GateConfig,
}

// Default functions
fn default_sync_interval() -> u64 {
    30
}
fn default_notify_command() -> String {
    "notify-send".into()
}
fn default_icon() -> String {
    "/icons/icon-192.png".into()
}
fn default_focus_minutes() -> u64 {
    25
}
fn default_redirect_path() -> String {
    "/public/intervention.html".into()
}
fn default_fixed_skip_rate() -> f64 {
    0.17
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            user_id: None,
            interval_minutes: default_sync_interval(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            command: default_notify_command(),
            icon: default_icon(),
        }
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_focus_minutes(),
        }
    }
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            redirect_path: default_redirect_path(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            completion_rate_policy: RatePolicyKind::default(),
            fixed_skip_rate: default_fixed_skip_rate(),
        }
    }
}

impl GateConfig {
    pub fn policy(&self) -> CompletionRatePolicy {
        match self.completion_rate_policy {
            RatePolicyKind::ElapsedRatio => CompletionRatePolicy::ElapsedRatio,
            RatePolicyKind::Fixed => CompletionRatePolicy::Fixed(self.fixed_skip_rate),
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
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // Unset optional strings accept an empty value to clear them.
                    serde_json::Value::Null if value.is_empty() => serde_json::Value::Null,
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `<data_dir>/config.toml`
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the defaults when the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
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

    /// Set a config value by dot-separated key. The caller persists with
    /// [`Config::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// into the field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Resolved path of the rules file.
    pub fn rules_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.blocking.rules_path {
            Some(p) if !p.is_empty() => Ok(PathBuf::from(p)),
            _ => Ok(data_dir()?.join("rules.json")),
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("{e}; using default configuration");
            Self::default()
        })
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
        assert_eq!(parsed.sync.interval_minutes, 30);
        assert_eq!(parsed.focus.default_minutes, 25);
        assert_eq!(parsed.gate.completion_rate_policy, RatePolicyKind::ElapsedRatio);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.notifications.icon, "/icons/icon-192.png");
        assert_eq!(cfg.blocking.redirect_path, "/public/intervention.html");
        assert!(cfg.sync.endpoint.is_none());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("focus.default_minutes").as_deref(), Some("25"));
        assert_eq!(
            cfg.get("notifications.command").as_deref(),
            Some("notify-send")
        );
        assert!(cfg.get("focus.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_nested_values_by_type() {
        let mut cfg = Config::default();
        cfg.set("sync.interval_minutes", "15").unwrap();
        cfg.set("sync.endpoint", "https://example.com/api/sync").unwrap();
        cfg.set("gate.fixed_skip_rate", "0.25").unwrap();
        assert_eq!(cfg.sync.interval_minutes, 15);
        assert_eq!(
            cfg.sync.endpoint.as_deref(),
            Some("https://example.com/api/sync")
        );
        assert!((cfg.gate.fixed_skip_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("focus.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("focus.default_minutes", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(cfg.set("gate.completion_rate_policy", "random").is_err());
    }

    #[test]
    fn rate_policy_maps_to_gate_policy() {
        let mut cfg = Config::default();
        assert_eq!(cfg.gate.policy(), CompletionRatePolicy::ElapsedRatio);
        cfg.set("gate.completion_rate_policy", "fixed").unwrap();
        assert_eq!(cfg.gate.policy(), CompletionRatePolicy::Fixed(0.17));
    }

    #[test]
    fn load_from_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.focus.default_minutes, 25);

        let mut edited = cfg.clone();
        edited.set("sync.user_id", "user-1").unwrap();
        edited.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.sync.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "focus = 3").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
