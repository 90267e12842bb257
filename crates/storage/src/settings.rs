//! Plaintext application state kept next to the connection payload.
//!
//! Settings, the action log, performance metrics and custom scripts always go
//! through the local [`KvStore`], whichever backend serves connections, and are
//! never encrypted. The two logs are capped lists stored newest first.

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    termvault_config::LogsConfig,
    tokio::sync::{Mutex, broadcast},
};

use crate::{
    error::Result,
    kv::KvStore,
    types::{
        ACTION_LOG_KEY, CUSTOM_SCRIPTS_KEY, PERFORMANCE_METRICS_KEY, SETTINGS_KEY, now_ms,
    },
};

/// Settings key under which a calibrated PBKDF2 iteration count is kept.
pub const PBKDF2_ITERATIONS_SETTING: &str = "pbkdf2Iterations";

const EVENT_CAPACITY: usize = 64;

// ── Entries ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub timestamp: i64,
    pub action: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub timestamp: i64,
    pub name: String,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// A user-defined script. Fields beyond `id`, `name` and `script` are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomScript {
    pub id: String,
    pub name: String,
    pub script: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Published after a settings write.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEvent {
    Saved(Map<String, Value>),
}

/// Caps for the two newest-first logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLimits {
    pub action_log_max: usize,
    pub performance_metrics_max: usize,
}

impl Default for LogLimits {
    fn default() -> Self {
        LogsConfig::default().into()
    }
}

impl From<LogsConfig> for LogLimits {
    fn from(config: LogsConfig) -> Self {
        Self {
            action_log_max: config.action_log_max,
            performance_metrics_max: config.performance_metrics_max,
        }
    }
}

/// Insert `entry` at the front and drop tail entries beyond `max`.
pub fn push_capped<T>(list: &mut Vec<T>, entry: T, max: usize) {
    list.insert(0, entry);
    list.truncate(max);
}

// ── SettingsStore ───────────────────────────────────────────────────────────

pub struct SettingsStore {
    kv: KvStore,
    limits: LogLimits,
    events: broadcast::Sender<SettingsEvent>,
    /// Serializes read-modify-write of the capped lists and settings map.
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(kv: KvStore, limits: LogLimits) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            kv,
            limits,
            events,
            write_lock: Mutex::new(()),
        }
    }

    /// Receive a [`SettingsEvent`] for every subsequent settings write.
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.events.subscribe()
    }

    // ── Settings ────────────────────────────────────────────────────────────

    /// The stored settings map; empty if none were saved.
    pub async fn settings(&self) -> Result<Map<String, Value>> {
        Ok(self.kv.get_as(SETTINGS_KEY).await?.unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: Map<String, Value>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.set_as(SETTINGS_KEY, &settings).await?;
        self.publish(settings);
        Ok(())
    }

    pub async fn setting(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.settings().await?.remove(key))
    }

    /// Set one key in the settings map, leaving the others untouched.
    pub async fn update_setting(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.settings().await?;
        settings.insert(key.to_owned(), value);
        self.kv.set_as(SETTINGS_KEY, &settings).await?;
        self.publish(settings);
        Ok(())
    }

    fn publish(&self, settings: Map<String, Value>) {
        // No receivers is fine.
        let _ = self.events.send(SettingsEvent::Saved(settings));
    }

    // ── Action log ──────────────────────────────────────────────────────────

    /// Newest first.
    pub async fn action_log(&self) -> Result<Vec<ActionLogEntry>> {
        Ok(self.kv.get_as(ACTION_LOG_KEY).await?.unwrap_or_default())
    }

    pub async fn log_action(&self, action: impl Into<String>, details: Value) -> Result<()> {
        let entry = ActionLogEntry {
            timestamp: now_ms(),
            action: action.into(),
            details,
        };
        let _guard = self.write_lock.lock().await;
        let mut log = self.action_log().await?;
        push_capped(&mut log, entry, self.limits.action_log_max);
        self.kv.set_as(ACTION_LOG_KEY, &log).await
    }

    pub async fn clear_action_log(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(ACTION_LOG_KEY).await?;
        Ok(())
    }

    // ── Performance metrics ─────────────────────────────────────────────────

    /// Newest first.
    pub async fn performance_metrics(&self) -> Result<Vec<PerformanceMetric>> {
        Ok(self
            .kv
            .get_as(PERFORMANCE_METRICS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn record_metric(
        &self,
        name: impl Into<String>,
        duration_ms: f64,
        details: Value,
    ) -> Result<()> {
        let metric = PerformanceMetric {
            timestamp: now_ms(),
            name: name.into(),
            duration_ms,
            details,
        };
        let _guard = self.write_lock.lock().await;
        let mut metrics = self.performance_metrics().await?;
        push_capped(&mut metrics, metric, self.limits.performance_metrics_max);
        self.kv.set_as(PERFORMANCE_METRICS_KEY, &metrics).await
    }

    pub async fn clear_performance_metrics(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(PERFORMANCE_METRICS_KEY).await?;
        Ok(())
    }

    // ── Custom scripts ──────────────────────────────────────────────────────

    pub async fn custom_scripts(&self) -> Result<Vec<CustomScript>> {
        Ok(self.kv.get_as(CUSTOM_SCRIPTS_KEY).await?.unwrap_or_default())
    }

    pub async fn save_custom_scripts(&self, scripts: &[CustomScript]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.set_as(CUSTOM_SCRIPTS_KEY, &scripts).await
    }
}
