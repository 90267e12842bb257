//! Config schema types (storage location, key derivation, log caps).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermvaultConfig {
    pub storage: StorageConfig,
    pub kdf: KdfConfig,
    pub logs: LogsConfig,
}

/// Where the local key-value database lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the database. `None` means the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Database file name inside `data_dir`.
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: "termvault.db".into(),
        }
    }
}

impl StorageConfig {
    /// Resolved path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        let dir = self
            .data_dir
            .clone()
            .or_else(crate::loader::data_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join(&self.database)
    }
}

/// PBKDF2 iteration count and host calibration bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Fixed iteration count; skips calibration and the persisted setting.
    pub iterations: Option<u32>,
    /// Used when calibration is disabled or fails.
    pub default_iterations: u32,
    pub benchmark_target_secs: f64,
    pub benchmark_max_total_secs: f64,
    pub benchmark_max_rounds: u32,
    /// Run the benchmark at startup when no iteration count is known yet.
    pub calibrate_on_startup: bool,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            iterations: None,
            default_iterations: 100_000,
            benchmark_target_secs: 1.0,
            benchmark_max_total_secs: 30.0,
            benchmark_max_rounds: 20,
            calibrate_on_startup: false,
        }
    }
}

/// Caps for the newest-first plaintext logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub action_log_max: usize,
    pub performance_metrics_max: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            action_log_max: 1000,
            performance_metrics_max: 500,
        }
    }
}
