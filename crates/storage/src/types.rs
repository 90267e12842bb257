//! Persisted payload and metadata shapes, and the local store's key names.

use std::time::{SystemTime, UNIX_EPOCH};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    termvault_vault::SealedEnvelope,
};

use crate::error::{Error, Result};

/// Connection list: JSON plaintext or base64 ciphertext string.
pub const CONNECTIONS_KEY: &str = "connections";
/// Current location of [`StorageMetadata`].
pub const METADATA_KEY: &str = "storage_metadata";
/// Where older releases kept [`StorageMetadata`].
pub const LEGACY_METADATA_KEY: &str = "connections_meta";
pub const SETTINGS_KEY: &str = "settings";
pub const ACTION_LOG_KEY: &str = "action_log";
pub const PERFORMANCE_METRICS_KEY: &str = "performance_metrics";
pub const CUSTOM_SCRIPTS_KEY: &str = "custom_scripts";

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A saved remote-connection profile.
///
/// Only `id` is interpreted here; every other field is carried through
/// unchanged so the application can evolve its profile shape freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Stored credential. Sensitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Connection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            protocol: None,
            hostname: None,
            port: None,
            username: None,
            password: None,
            extra: Map::new(),
        }
    }
}

/// The plaintext payload that is encrypted or stored directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageData {
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub timestamp: i64,
}

impl StorageData {
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            connections,
            settings: Map::new(),
            timestamp: now_ms(),
        }
    }
}

/// Describes how the connections entry is stored.
///
/// `salt` and `iv` are present iff `is_encrypted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMetadata {
    pub is_encrypted: bool,
    pub has_password: bool,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    /// PBKDF2 iterations; absent in metadata written before calibration existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
}

impl StorageMetadata {
    pub fn plaintext(timestamp: i64) -> Self {
        Self {
            is_encrypted: false,
            has_password: false,
            timestamp,
            salt: None,
            iv: None,
            iterations: None,
        }
    }

    pub fn encrypted(sealed: &SealedEnvelope, timestamp: i64) -> Self {
        Self {
            is_encrypted: true,
            has_password: true,
            timestamp,
            salt: Some(sealed.salt.clone()),
            iv: Some(sealed.iv.clone()),
            iterations: Some(sealed.iterations),
        }
    }

    /// Rebuild the envelope for `ciphertext` from this metadata.
    pub fn sealed(&self, ciphertext: String) -> Result<SealedEnvelope> {
        if !self.is_encrypted {
            return Err(Error::corrupted("metadata does not describe encrypted data"));
        }
        match (&self.salt, &self.iv) {
            (Some(salt), Some(iv)) => Ok(SealedEnvelope {
                ciphertext,
                salt: salt.clone(),
                iv: iv.clone(),
                iterations: self
                    .iterations
                    .unwrap_or(termvault_vault::kdf::DEFAULT_ITERATIONS),
            }),
            _ => Err(Error::corrupted(
                "metadata marks data encrypted but salt or iv is missing",
            )),
        }
    }
}
