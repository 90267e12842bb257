//! Configuration loading and validation.
//!
//! Config files: `termvault.toml`, `termvault.yaml`, or `termvault.json`
//! Searched in `./` then `~/.config/termvault/`.
//!
//! `TERMVAULT_DATA_DIR` and `TERMVAULT_KDF_ITERATIONS` override file values.

pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, find_or_default_config_path,
        load_config, save_config_to,
    },
    schema::{KdfConfig, LogsConfig, StorageConfig, TermvaultConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
