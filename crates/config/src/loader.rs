use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::TermvaultConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "termvault.toml",
    "termvault.yaml",
    "termvault.yml",
    "termvault.json",
];

/// Environment variable overriding `storage.data_dir`.
pub const ENV_DATA_DIR: &str = "TERMVAULT_DATA_DIR";

/// Environment variable overriding `kdf.iterations`.
pub const ENV_KDF_ITERATIONS: &str = "TERMVAULT_KDF_ITERATIONS";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<TermvaultConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./termvault.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/termvault/termvault.{toml,yaml,yml,json}` (user-global)
///
/// Returns `TermvaultConfig::default()` if no config file is found. Environment
/// overrides are applied either way.
pub fn discover_and_load() -> TermvaultConfig {
    let mut config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                TermvaultConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        TermvaultConfig::default()
    };
    apply_env_overrides(&mut config);
    config
}

/// Apply `TERMVAULT_*` environment overrides.
pub fn apply_env_overrides(config: &mut TermvaultConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] with an injectable lookup, so tests don't
/// mutate the process environment.
fn apply_env_overrides_with(config: &mut TermvaultConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
        config.storage.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(raw) = lookup(ENV_KDF_ITERATIONS) {
        match raw.trim().parse::<u32>() {
            Ok(n) if n > 0 => config.kdf.iterations = Some(n),
            _ => warn!(value = %raw, "ignoring invalid {ENV_KDF_ITERATIONS}"),
        }
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/termvault/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "termvault").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory where the database lives by default.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "termvault").map(|d| d.data_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("termvault.toml")
}

/// Serialize `config` to TOML at `path`, creating parent directories.
pub fn save_config_to(config: &TermvaultConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<TermvaultConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termvault.toml");
        std::fs::write(&path, "[kdf]\ndefault_iterations = 5000\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.kdf.default_iterations, 5000);
    }

    #[test]
    fn load_yaml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("termvault.yaml");
        std::fs::write(&yaml, "logs:\n  action_log_max: 7\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().logs.action_log_max, 7);

        let json = dir.path().join("termvault.json");
        std::fs::write(&json, r#"{"logs":{"performance_metrics_max":3}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().logs.performance_metrics_max, 3);
    }

    #[test]
    fn unsupported_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termvault.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("termvault.toml");
        let mut cfg = TermvaultConfig::default();
        cfg.kdf.iterations = Some(321_000);
        cfg.storage.data_dir = Some(dir.path().to_path_buf());

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = TermvaultConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            ENV_DATA_DIR => Some("/var/lib/termvault".into()),
            ENV_KDF_ITERATIONS => Some("150000".into()),
            _ => None,
        });
        assert_eq!(
            cfg.storage.data_dir,
            Some(PathBuf::from("/var/lib/termvault"))
        );
        assert_eq!(cfg.kdf.iterations, Some(150_000));
    }

    #[test]
    fn invalid_iteration_override_ignored() {
        let mut cfg = TermvaultConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            ENV_KDF_ITERATIONS => Some("zero".into()),
            _ => None,
        });
        assert_eq!(cfg.kdf.iterations, None);

        apply_env_overrides_with(&mut cfg, |name| match name {
            ENV_KDF_ITERATIONS => Some("0".into()),
            _ => None,
        });
        assert_eq!(cfg.kdf.iterations, None);
    }
}
