//! # Player Configuration Module
//!
//! Configuration management for the playback orchestrator:
//! - Loading configuration from a YAML file
//! - Merging with the embedded default configuration
//! - Environment variable overrides (`VODPLAY_CONFIG__SECTION__KEY=value`)
//! - Typed getters and setters with defaults
//! - Optional process-wide singleton access
//!
//! ## Usage
//!
//! ```no_run
//! use vodconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let interval = config.get_poll_interval_ms()?;
//! config.set_auto_advance(true)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("vodplay.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load player configuration"));
}

const ENV_CONFIG_DIR: &str = "VODPLAY_CONFIG";
const ENV_PREFIX: &str = "VODPLAY_CONFIG__";
const CONFIG_DIR_NAME: &str = ".vodplay";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_LOADING_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CONTROLS_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_AUTO_ADVANCE: bool = false;
pub const DEFAULT_PIP_ON_BACKGROUND: bool = true;
pub const DEFAULT_PLAYBACK_RATE: f64 = 1.0;
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";

/// Generates a getter/setter pair for u64 values with a default.
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => Ok(n.as_u64().unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse::<u64>().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Generates a getter/setter pair for bool values with a default.
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for the player.
///
/// Values are stored as a YAML tree guarded by a mutex; every setter writes
/// the merged tree back to `config.yaml` in the configuration directory.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Creates the directory if needed and checks it is readable and writable.
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory.
    ///
    /// Search order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `VODPLAY_CONFIG` environment variable
    /// 3. `.vodplay` in the current directory
    /// 4. `.vodplay` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory.
    ///
    /// The embedded defaults are merged with `config.yaml` (when present),
    /// keys are lower-cased, environment overrides are applied and the
    /// merged result is written back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut config_value = Self::merged_with_defaults(fs::read(&path).ok().as_deref())?;
        Self::apply_env_overrides(&mut config_value, env::vars());

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Builds an in-memory configuration from a YAML document, without touching disk.
    ///
    /// Setters on such a configuration only update memory.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config_value = Self::merged_with_defaults(Some(yaml.as_bytes()))?;
        Ok(Config {
            config_dir: String::new(),
            path: String::new(),
            data: Mutex::new(config_value),
        })
    }

    fn merged_with_defaults(external: Option<&[u8]>) -> Result<Value> {
        let mut default_value = Self::lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);
        match external {
            Some(data) => {
                let external_value = Self::lower_keys_value(serde_yaml::from_slice(data)?);
                if !external_value.is_null() {
                    merge_yaml(&mut default_value, &external_value);
                }
            }
            None => info!("Config file not found, using default embedded config"),
        }
        Ok(default_value)
    }

    /// Saves the current configuration to the config.yaml file.
    pub fn save(&self) -> Result<()> {
        if self.path.is_empty() {
            return Ok(());
        }
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Returns the directory the configuration was loaded from.
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Sets a configuration value at the specified path and saves it.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(variable = %key, error = %err, "Ignoring config override");
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    impl_u64_config!(
        get_poll_interval_ms,
        set_poll_interval_ms,
        &["player", "poll_interval_ms"],
        DEFAULT_POLL_INTERVAL_MS
    );

    impl_u64_config!(
        get_loading_timeout_ms,
        set_loading_timeout_ms,
        &["player", "loading_timeout_ms"],
        DEFAULT_LOADING_TIMEOUT_MS
    );

    impl_u64_config!(
        get_controls_timeout_ms,
        set_controls_timeout_ms,
        &["player", "controls_timeout_ms"],
        DEFAULT_CONTROLS_TIMEOUT_MS
    );

    impl_u64_config!(
        get_metadata_timeout_secs,
        set_metadata_timeout_secs,
        &["metadata", "timeout_secs"],
        DEFAULT_METADATA_TIMEOUT_SECS
    );

    impl_bool_config!(
        get_auto_advance,
        set_auto_advance,
        &["player", "auto_advance"],
        DEFAULT_AUTO_ADVANCE
    );

    impl_bool_config!(
        get_pip_on_background,
        set_pip_on_background,
        &["player", "pip_on_background"],
        DEFAULT_PIP_ON_BACKGROUND
    );

    /// Playback rate applied to a fresh session.
    pub fn get_default_rate(&self) -> Result<f64> {
        match self.get_value(&["player", "default_rate"]) {
            Ok(Value::Number(n)) => Ok(n.as_f64().unwrap_or(DEFAULT_PLAYBACK_RATE)),
            _ => Ok(DEFAULT_PLAYBACK_RATE),
        }
    }

    pub fn set_default_rate(&self, rate: f64) -> Result<()> {
        if !(rate > 0.0) {
            return Err(anyhow!("Playback rate must be positive, got {}", rate));
        }
        self.set_value(&["player", "default_rate"], Value::Number(Number::from(rate)))
    }

    /// Base URL of the metadata service, `None` when unset or empty.
    pub fn get_metadata_base_url(&self) -> Option<String> {
        match self.get_value(&["metadata", "base_url"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => {
                Some(s.trim().trim_end_matches('/').to_string())
            }
            Ok(_) => None,
            Err(err) => {
                warn!("Failed to get metadata base URL: {}", err);
                None
            }
        }
    }

    pub fn set_metadata_base_url(&self, url: String) -> Result<()> {
        self.set_value(&["metadata", "base_url"], Value::String(url))
    }

    /// Minimum log level for hosts that install a subscriber from config.
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Returns the global configuration instance, loaded lazily on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Recursively merges `external` into `default`.
///
/// Mappings are merged key by key; scalars and sequences are replaced.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_embedded_config() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.get_poll_interval_ms().unwrap(), 500);
        assert_eq!(config.get_loading_timeout_ms().unwrap(), 60_000);
        assert_eq!(config.get_controls_timeout_ms().unwrap(), 5_000);
        assert!(!config.get_auto_advance().unwrap());
        assert!(config.get_pip_on_background().unwrap());
        assert_eq!(config.get_default_rate().unwrap(), 1.0);
        assert_eq!(config.get_metadata_base_url(), None);
    }

    #[test]
    fn test_external_yaml_is_merged() {
        let config = Config::from_yaml_str(
            "PLAYER:\n  Poll_Interval_Ms: 250\nmetadata:\n  base_url: \"http://api.local/\"\n",
        )
        .unwrap();
        assert_eq!(config.get_poll_interval_ms().unwrap(), 250);
        // untouched keys keep their defaults
        assert_eq!(config.get_loading_timeout_ms().unwrap(), 60_000);
        assert_eq!(
            config.get_metadata_base_url().as_deref(),
            Some("http://api.local")
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut value = Config::merged_with_defaults(None).unwrap();
        Config::apply_env_overrides(
            &mut value,
            vec![
                (
                    "VODPLAY_CONFIG__PLAYER__AUTO_ADVANCE".to_string(),
                    "true".to_string(),
                ),
                ("UNRELATED".to_string(), "1".to_string()),
            ],
        );
        let config = Config {
            config_dir: String::new(),
            path: String::new(),
            data: Mutex::new(value),
        };
        assert!(config.get_auto_advance().unwrap());
    }

    #[test]
    fn test_set_default_rate_rejects_non_positive() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert!(config.set_default_rate(0.0).is_err());
        config.set_default_rate(1.5).unwrap();
        assert_eq!(config.get_default_rate().unwrap(), 1.5);
    }

    #[test]
    fn test_log_min_level() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.get_log_min_level().unwrap(), "INFO");
        config.set_log_min_level("DEBUG".to_string()).unwrap();
        assert_eq!(config.get_log_min_level().unwrap(), "DEBUG");

        let config = Config::from_yaml_str("host:\n  logger:\n    min_level: WARN\n").unwrap();
        assert_eq!(config.get_log_min_level().unwrap(), "WARN");
    }

    #[test]
    fn test_load_config_writes_merged_file() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "player:\n  loading_timeout_ms: 1000\n",
        )
        .unwrap();

        let config = Config::load_config(dir_str).unwrap();
        assert_eq!(config.get_loading_timeout_ms().unwrap(), 1000);
        config.set_controls_timeout_ms(3000).unwrap();

        let reloaded = Config::load_config(dir_str).unwrap();
        assert_eq!(reloaded.get_controls_timeout_ms().unwrap(), 3000);
        assert_eq!(reloaded.get_loading_timeout_ms().unwrap(), 1000);
    }
}
