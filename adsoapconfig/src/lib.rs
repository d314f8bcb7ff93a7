//! # adsoap Configuration Module
//!
//! This module provides configuration management for the adsoap helpers, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//!
//! ## Usage
//!
//! ```no_run
//! use adsoapconfig::Config;
//!
//! let config = Config::load_config("")?;
//!
//! let namespace = config.get_api_namespace();
//! let dump_dir = config.get_managed_dir(&["dumper", "directory"], "dumps")?;
//!
//! config.set_dumper_enabled(true)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("adsoap.yaml");

const ENV_CONFIG_DIR: &str = "ADSOAP_CONFIG";
const ENV_PREFIX: &str = "ADSOAP_CONFIG__";
const CONFIG_DIR_NAME: &str = ".adsoap";

// Default values for configuration
const DEFAULT_API_NAMESPACE: &str = "API";
const DEFAULT_DUMP_DIR: &str = "dumps";
const DEFAULT_DUMPER_ENABLED: bool = false;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";

/// Macro to generate getter/setter for bool values with default
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

/// Configuration manager
///
/// Holds the merged YAML tree (embedded defaults, `config.yaml`, environment
/// overrides) and writes it back on every change. There is no global
/// instance: load it once and pass it to whoever needs it.
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        // 1. Try provided directory
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return PathBuf::from(CONFIG_DIR_NAME);
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(CONFIG_DIR_NAME)
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        // Test read permission
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `ADSOAP_CONFIG` environment variable
    /// 3. `.adsoap` in the current directory
    /// 4. `.adsoap` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<PathBuf> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(&dir_path).map_err(|e| {
            anyhow!(
                "Cannot use configuration directory {}: {}",
                dir_path.display(),
                e
            )
        })?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        Self::load_config_with_overrides(directory, env::vars())
    }

    /// Same as [`Config::load_config`], with an explicit set of
    /// `ADSOAP_CONFIG__*` style variables instead of the process environment.
    pub fn load_config_with_overrides<I>(directory: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir=%config_dir.display(), "Using config directory");

        let path = config_dir.join("config.yaml");

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file=%path.display(), "Loaded config file");
            data
        } else {
            info!(config_file=%path.display(), "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        // Un fichier vide est lu comme Null : on garde les valeurs par défaut
        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        if !external_value.is_null() {
            merge_yaml(&mut default_value, &external_value);
        }
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value, vars);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Directory holding `config.yaml`
    pub fn directory(&self) -> &Path {
        &self.config_dir
    }

    fn lock(&self) -> Result<MutexGuard<'_, Value>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("Configuration lock poisoned"))
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.lock()?;
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["dumper", "directory"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.lock()?;
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

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock()?;
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
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
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    tracing::warn!(variable=%key, "Ignoring environment override: {}", e);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Résout un chemin relatif par rapport au répertoire de configuration
    fn resolve_dir(&self, dir_path: &str) -> PathBuf {
        let path = Path::new(dir_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Récupère un répertoire géré par la configuration
    ///
    /// Le répertoire peut être absolu ou relatif au répertoire de
    /// configuration. Il n'est pas créé ici : c'est au composant qui
    /// l'utilise de le préparer avec ses propres droits d'accès.
    ///
    /// # Arguments
    ///
    /// * `path` - Chemin dans l'arbre de configuration (ex: `&["dumper", "directory"]`)
    /// * `default` - Nom de répertoire par défaut si non configuré
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };
        Ok(self.resolve_dir(&dir_path))
    }

    /// Définit un répertoire géré par la configuration
    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Gets the target namespace of the API responses
    ///
    /// Falls back to `"API"` when unset or not a string.
    pub fn get_api_namespace(&self) -> String {
        match self.get_value(&["api", "namespace"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            Ok(_) => {
                tracing::warn!(
                    "API namespace is not a string or empty, using default {}",
                    DEFAULT_API_NAMESPACE
                );
                DEFAULT_API_NAMESPACE.to_string()
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to get API namespace: {}, using default {}",
                    err,
                    DEFAULT_API_NAMESPACE
                );
                DEFAULT_API_NAMESPACE.to_string()
            }
        }
    }

    pub fn set_api_namespace(&self, namespace: String) -> Result<()> {
        self.set_value(&["api", "namespace"], Value::String(namespace))
    }

    /// Raw `transport.<section>` mapping, `Null` when absent
    pub fn get_transport_section(&self, section: &str) -> Value {
        self.get_value(&["transport", section])
            .unwrap_or(Value::Null)
    }

    /// Gets the directory receiving SOAP dumps (absolute)
    pub fn get_dump_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["dumper", "directory"], DEFAULT_DUMP_DIR)
    }

    pub fn set_dump_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["dumper", "directory"], directory)
    }

    impl_bool_config!(
        get_dumper_enabled,
        set_dumper_enabled,
        &["dumper", "enabled"],
        DEFAULT_DUMPER_ENABLED
    );

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["logger", "min_level"], Value::String(level))
    }
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
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

    fn load(dir: &Path, vars: Vec<(&str, &str)>) -> Config {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>();
        Config::load_config_with_overrides(dir.to_str().unwrap(), vars).unwrap()
    }

    #[test]
    fn test_defaults_are_loaded_and_saved() {
        let temp = tempfile::tempdir().unwrap();
        let config = load(temp.path(), vec![]);

        assert_eq!(config.get_api_namespace(), "API");
        assert!(!config.get_dumper_enabled().unwrap());
        assert_eq!(config.get_log_min_level().unwrap(), "INFO");
        assert!(temp.path().join("config.yaml").exists());
    }

    #[test]
    fn test_config_file_is_merged_over_defaults() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("config.yaml"),
            "api:\n  Namespace: \"urn:ads\"\n",
        )
        .unwrap();

        let config = load(temp.path(), vec![]);

        assert_eq!(config.get_api_namespace(), "urn:ads");
        // les autres sections restent celles par défaut
        assert_eq!(config.get_log_min_level().unwrap(), "INFO");
    }

    #[test]
    fn test_env_overrides() {
        let temp = tempfile::tempdir().unwrap();
        let config = load(
            temp.path(),
            vec![
                ("ADSOAP_CONFIG__DUMPER__ENABLED", "true"),
                ("ADSOAP_CONFIG__LOGGER__MIN_LEVEL", "debug"),
                ("UNRELATED", "x"),
            ],
        );

        assert!(config.get_dumper_enabled().unwrap());
        assert_eq!(config.get_log_min_level().unwrap(), "debug");
    }

    #[test]
    fn test_dump_dir_is_relative_to_config_dir() {
        let temp = tempfile::tempdir().unwrap();
        let config = load(temp.path(), vec![]);

        assert_eq!(config.get_dump_dir().unwrap(), temp.path().join("dumps"));

        config.set_dump_dir("/var/tmp/soap".to_string()).unwrap();
        assert_eq!(config.get_dump_dir().unwrap(), PathBuf::from("/var/tmp/soap"));
    }

    #[test]
    fn test_set_value_persists() {
        let temp = tempfile::tempdir().unwrap();
        {
            let config = load(temp.path(), vec![]);
            config.set_dumper_enabled(true).unwrap();
        }
        let config = load(temp.path(), vec![]);
        assert!(config.get_dumper_enabled().unwrap());
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let config = load(temp.path(), vec![]);
        assert!(config.get_value(&["nope", "missing"]).is_err());
    }

    #[test]
    fn test_merge_yaml_replaces_sequences() {
        let mut default: Value = serde_yaml::from_str("a:\n  b: [1, 2]\n  c: 3\n").unwrap();
        let external: Value = serde_yaml::from_str("a:\n  b: [9]\n").unwrap();
        merge_yaml(&mut default, &external);

        let expected: Value = serde_yaml::from_str("a:\n  b: [9]\n  c: 3\n").unwrap();
        assert_eq!(default, expected);
    }
}
