//! Record types persisted by the [`RecordStore`](super::RecordStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::gate::BreathingPattern;

/// One resolved intervention (completed or skipped). Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionRecord {
    pub id: String,
    pub site_or_app_id: String,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: u64,
    pub was_skipped: bool,
    /// 0.0 .. 1.0
    pub completion_rate: f64,
}

impl InterventionRecord {
    /// Id scheme used by the gate: `{timestamp_millis}-{site_or_app_id}`.
    pub fn make_id(timestamp: DateTime<Utc>, site_or_app_id: &str) -> String {
        format!("{}-{}", timestamp.timestamp_millis(), site_or_app_id)
    }
}

/// User-facing intervention settings. Exactly one instance exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_intervention_duration")]
    pub intervention_duration_seconds: u64,
    #[serde(default = "default_true")]
    pub allow_skip: bool,
    #[serde(default = "default_skip_delay")]
    pub skip_delay_seconds: u64,
    #[serde(default)]
    pub breathing_pattern: BreathingPattern,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

fn default_intervention_duration() -> u64 {
    60
}
fn default_skip_delay() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            intervention_duration_seconds: default_intervention_duration(),
            allow_skip: true,
            skip_delay_seconds: default_skip_delay(),
            breathing_pattern: BreathingPattern::default(),
            notifications_enabled: true,
        }
    }
}

impl Settings {
    fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Get a field as a string by its camelCase name.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.to_json_value().get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a field by its camelCase name, parsing `value` according to the
    /// field's current type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ValidationError> {
        let mut json = self.to_json_value();
        let obj = json.as_object_mut().ok_or_else(|| invalid(key, "not an object"))?;
        let existing = obj.get(key).ok_or_else(|| invalid(key, "unknown setting"))?;
        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value.parse::<bool>().map_err(|e| invalid(key, &e.to_string()))?,
            ),
            serde_json::Value::Number(_) => serde_json::Value::Number(
                value
                    .parse::<u64>()
                    .map_err(|e| invalid(key, &e.to_string()))?
                    .into(),
            ),
            _ => serde_json::Value::String(value.to_string()),
        };
        obj.insert(key.to_string(), new_value);
        *self = serde_json::from_value(json).map_err(|e| invalid(key, &e.to_string()))?;
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Which collections a `clear` call wipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Interventions,
    Settings,
    Blocked,
    All,
}

/// Full export bundle of the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    pub interventions: Vec<InterventionRecord>,
    pub settings: Settings,
    #[serde(alias = "blockedApps", alias = "blockedSites")]
    pub blocked: Vec<String>,
    pub last_sync: DateTime<Utc>,
}

/// Today's activity, as shown by the extension popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub interventions: u64,
    pub completed: u64,
    pub skipped: u64,
    pub time_saved_minutes: u64,
}

/// Minutes assumed saved per intervention.
pub const MINUTES_SAVED_PER_INTERVENTION: u64 = 5;

impl DailySummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a InterventionRecord>) -> Self {
        let mut summary = DailySummary::default();
        for record in records {
            summary.interventions += 1;
            if record.was_skipped {
                summary.skipped += 1;
            } else {
                summary.completed += 1;
            }
        }
        summary.time_saved_minutes = summary.interventions * MINUTES_SAVED_PER_INTERVENTION;
        summary
    }

    /// "1h 5m" / "45m"
    pub fn time_saved_label(&self) -> String {
        let hours = self.time_saved_minutes / 60;
        let minutes = self.time_saved_minutes % 60;
        if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        }
    }
}

/// Normalize a site or app identifier: trim, lower-case, drop scheme, path
/// and a leading `www.`.
pub fn normalize_identifier(raw: &str) -> Result<String, ValidationError> {
    let mut id = raw.trim().to_ascii_lowercase();
    if let Some(rest) = id.split_once("://").map(|(_, rest)| rest.to_string()) {
        id = rest;
    }
    if let Some(idx) = id.find(['/', '?', '#']) {
        id.truncate(idx);
    }
    if let Some(rest) = id.strip_prefix("www.") {
        id = rest.to_string();
    }
    if id.is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }
    Ok(id)
}
