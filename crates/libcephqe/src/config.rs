//! CephCI configuration (`~/.cephci.yaml`) and per-test data.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "CEPHCI_CONFIG";
const CONFIG_FILE: &str = ".cephci.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}, create it from cephci.yaml.template")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("no {0} configured")]
    Missing(String),
    #[error("cannot convert {0} to bool")]
    NotBool(String),
    #[error("cannot convert {value} to dict")]
    NotDict {
        value: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    pub registry: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCredentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub serverurl: Option<String>,
    #[serde(default)]
    pub baseurl: Option<String>,
    /// Seconds allowed for registration, across all retries
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry")]
    pub retry: u64,
}

fn default_timeout() -> u64 {
    600
}

fn default_retry() -> u64 {
    10
}

/// Contents of `~/.cephci.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CephciConfig {
    /// server -> build (`rh` | `ibm`) -> credentials
    pub registry: BTreeMap<String, BTreeMap<String, RegistryCredentials>>,
    /// server (`cdn` | `stage`) -> credentials
    pub subscription: BTreeMap<String, SubscriptionCredentials>,
    /// server (`local` | `cdn` | `stage`) -> distro (`rhel-9`) -> repos
    pub repos: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub packages: Vec<String>,
}

/// `$CEPHCI_CONFIG`, falling back to `~/.cephci.yaml`.
pub fn default_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/root"), PathBuf::from);
    home.join(CONFIG_FILE)
}

impl CephciConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn registry_credentials(
        &self,
        server: &str,
        build: &str,
    ) -> Result<&RegistryCredentials, ConfigError> {
        self.registry
            .get(server)
            .and_then(|builds| builds.get(build))
            .ok_or_else(|| ConfigError::Missing(format!("registry credentials for {server}/{build}")))
    }

    pub fn subscription_credentials(
        &self,
        server: &str,
    ) -> Result<&SubscriptionCredentials, ConfigError> {
        self.subscription
            .get(server)
            .ok_or_else(|| ConfigError::Missing(format!("subscription credentials for {server}")))
    }

    pub fn repos(&self, server: &str, distro: &str) -> Result<&[String], ConfigError> {
        self.repos
            .get(server)
            .and_then(|distros| distros.get(distro))
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigError::Missing(format!("repos for {server}/{distro}")))
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }
}

/// Parsed value of a `custom-config` entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomValue {
    Bool(bool),
    Map(serde_json::Map<String, serde_json::Value>),
    List(Vec<String>),
    Str(String),
}

impl CustomValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CustomValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CustomValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Test specific settings handed to a test by the suite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestData {
    #[serde(rename = "custom-config", default)]
    pub custom_config: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl TestData {
    pub fn with_custom_config(entries: &[&str]) -> Self {
        Self {
            custom_config: entries.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Value of `key` from the `custom-config` list, if present.
    pub fn get_custom_config_value(&self, key: &str) -> Result<Option<CustomValue>, ConfigError> {
        for entry in &self.custom_config {
            if let Some((k, v)) = entry.split_once('=') {
                if k.trim() == key {
                    return parse_value(v.trim()).map(Some);
                }
            }
        }
        Ok(None)
    }

    /// Boolean switch from `custom-config`, `false` when absent or not a bool.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get_custom_config_value(key), Ok(Some(CustomValue::Bool(true))))
    }
}

pub fn str_to_bool(value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "t" | "yes" | "y" => Ok(true),
        "false" | "0" | "f" | "no" | "n" => Ok(false),
        _ => Err(ConfigError::NotBool(value.to_owned())),
    }
}

/// Rewrites a Python dict literal as JSON: single quoted strings become
/// double quoted and the bare `True`, `False` and `None` become their JSON
/// counterparts.
fn dict_to_json(value: &str) -> String {
    let mut json = String::with_capacity(value.len());
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let flush = |word: &mut String, json: &mut String| {
        json.push_str(match word.as_str() {
            "True" => "true",
            "False" => "false",
            "None" => "null",
            other => other,
        });
        word.clear();
    };
    for c in value.chars() {
        match quote {
            Some(q) if c == q => {
                json.push('"');
                quote = None;
            }
            Some(_) if c == '"' => json.push_str("\\\""),
            Some(_) => json.push(c),
            None if c == '\'' || c == '"' => {
                flush(&mut word, &mut json);
                json.push('"');
                quote = Some(c);
            }
            None if c.is_ascii_alphanumeric() || c == '_' => word.push(c),
            None => {
                flush(&mut word, &mut json);
                json.push(c);
            }
        }
    }
    flush(&mut word, &mut json);
    json
}

/// Interprets a config value as a bool, a `{...}` dict, a comma separated
/// list or a plain string, in that order.
pub fn parse_value(value: &str) -> Result<CustomValue, ConfigError> {
    if let Ok(b) = str_to_bool(value) {
        return Ok(CustomValue::Bool(b));
    }
    if value.starts_with('{') && value.ends_with('}') {
        return serde_json::from_str(&dict_to_json(value))
            .map(CustomValue::Map)
            .map_err(|source| ConfigError::NotDict {
                value: value.to_owned(),
                source,
            });
    }
    if value.contains(',') {
        return Ok(CustomValue::List(
            value.split(',').map(|s| s.trim().to_owned()).collect(),
        ));
    }
    Ok(CustomValue::Str(value.to_owned()))
}
