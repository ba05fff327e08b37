use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub battery: BatteryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Register the battery hook. Off gives a sensors-only driver.
    pub enabled: bool,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const SYSTEM_CONFIG: &str = "/etc/hp-vendor/config.toml";

/// A missing file is silent; an unreadable or malformed one is skipped with a warning.
fn load_file(path: &Path) -> Option<toml::Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("failed to read config at {}: {}", path.display(), e);
            return None;
        }
    };
    match toml::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("ignoring config at {}: {}", path.display(), e);
            None
        }
    }
}

fn load_system() -> Option<toml::Value> {
    load_file(Path::new(SYSTEM_CONFIG))
}

fn load_user() -> Option<toml::Value> {
    let path = dirs::config_dir()?.join("hp-vendor").join("config.toml");
    load_file(&path)
}

/// Tables merge key-by-key; any other value in `overlay` replaces `base`.
fn merge_values(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_values(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

fn load_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("failed to parse config at {}: {}", path.display(), e);
            Config::default()
        }),
        Err(e) => {
            tracing::warn!("failed to read config at {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// System config overlaid with the user config, or only `override_path` when given.
pub fn load(override_path: Option<&PathBuf>) -> Config {
    if let Some(path) = override_path {
        return load_from_path(path);
    }

    let merged = match (load_system(), load_user()) {
        (Some(s), Some(u)) => Some(merge_values(s, u)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    };

    match merged {
        Some(value) => value.try_into().unwrap_or_else(|e| {
            tracing::warn!("failed to deserialize config: {}", e);
            Config::default()
        }),
        None => Config::default(),
    }
}
