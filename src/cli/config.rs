//! This module defines and handles the config file of the `run` command: the Vault instances to keep
//! unsealed, their key shares, and the timing knobs of the unseal loop.

use std::{collections::BTreeMap, fmt, fs, path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::{
    api::ClientConfig,
    errors::AuError,
    utils::{deserialize_duration, serialize_duration},
    validator::{DefaultKeyValidator, KeyValidator, StrictKeyValidator, REDACTED},
};

pub const DEFAULT_THRESHOLD: usize = 3;
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// The options of one `run` invocation, loaded from an HCL or JSON file or a directory of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub instance: BTreeMap<String, Instance>,
    #[serde(default)]
    pub log_level: String,
    #[serde(
        default = "default_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,
    #[serde(
        default = "default_retry_delay",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub retry_delay: Duration,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(
        default = "default_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<StrictConfig>,
}

/// One Vault instance. `name` is taken from the block label.
#[derive(Clone, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default, skip_serializing)]
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub unseal_keys: Zeroizing<Vec<String>>,
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    #[serde(default, deserialize_with = "parse_bool_string")]
    pub tls_skip_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrictConfig {
    pub key_length: usize,
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbidden_strings: Option<Vec<String>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("unseal_keys", &format_args!("{} ({} keys)", REDACTED, self.unseal_keys.len()))
            .field("threshold", &self.threshold)
            .field("tls_skip_verify", &self.tls_skip_verify)
            .finish()
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> i64 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_threshold() -> usize {
    DEFAULT_THRESHOLD
}

fn parse_bool_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;
    match value {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(serde::de::Error::custom("Invalid value for bool")),
        },
        _ => Err(serde::de::Error::custom("Invalid value for bool")),
    }
}

impl Config {
    /// Instances of `other` are added, replacing same-named ones. Scalars of `other` win when they differ
    /// from their defaults.
    pub fn merge(&mut self, other: Config) {
        self.instance.extend(other.instance);

        if !other.log_level.is_empty() {
            self.log_level = other.log_level;
        }
        if other.timeout != default_timeout() {
            self.timeout = other.timeout;
        }
        if other.max_retries != default_max_retries() {
            self.max_retries = other.max_retries;
        }
        if other.retry_delay != default_retry_delay() {
            self.retry_delay = other.retry_delay;
        }
        if other.max_concurrency != default_max_concurrency() {
            self.max_concurrency = other.max_concurrency;
        }
        if other.interval != default_interval() {
            self.interval = other.interval;
        }
        if other.strict.is_some() {
            self.strict = other.strict;
        }
    }

    pub fn validator(&self) -> Arc<dyn KeyValidator> {
        match &self.strict {
            Some(strict) => {
                let mut validator =
                    StrictKeyValidator::new(strict.key_length).with_allowed_prefixes(strict.allowed_prefixes.clone());
                if let Some(forbidden) = &strict.forbidden_strings {
                    validator = validator.with_forbidden_strings(forbidden.clone());
                }
                Arc::new(validator)
            }
            None => Arc::new(DefaultKeyValidator::new()),
        }
    }

    /// Client settings for `instance`. The unseal strategy is left to the caller.
    pub fn client_config(&self, instance: &Instance) -> ClientConfig {
        ClientConfig {
            url: instance.endpoint.clone(),
            tls_skip_verify: instance.tls_skip_verify,
            timeout: self.timeout,
            validator: Some(self.validator()),
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            ..ClientConfig::default()
        }
    }
}

pub fn load_config(path: &str) -> Result<Config, AuError> {
    let f = Path::new(path);
    let config = if f.is_dir() {
        load_config_dir(path)?
    } else if f.is_file() {
        load_config_file(path)?
    } else {
        return Err(AuError::ErrConfigPathInvalid);
    };

    check_config(&config)?;
    Ok(config)
}

fn load_config_dir(dir: &str) -> Result<Config, AuError> {
    log::debug!("load_config_dir: {}", dir);
    let mut paths: Vec<String> = Vec::new();

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        if let Some(ext) = path.extension() {
            if ext == "hcl" || ext == "json" {
                paths.push(path.to_string_lossy().into_owned());
            }
        }
    }
    paths.sort();

    let mut result: Option<Config> = None;

    for path in paths {
        log::debug!("load_config_dir path: {}", path);
        let config = load_config_file(&path)?;
        match result.as_mut() {
            Some(merged) => merged.merge(config),
            None => result = Some(config),
        }
    }

    result.ok_or(AuError::ErrConfigLoadFailed)
}

fn load_config_file(path: &str) -> Result<Config, AuError> {
    log::debug!("load_config_file: {}", path);
    let file = fs::File::open(path)?;

    let mut config: Config = if path.ends_with(".hcl") {
        hcl::from_reader(file)?
    } else if path.ends_with(".json") {
        serde_json::from_reader(file)?
    } else {
        return Err(AuError::ErrConfigPathInvalid);
    };

    config.instance.iter_mut().for_each(|(key, value)| value.name = key.clone());
    Ok(config)
}

fn check_config(config: &Config) -> Result<(), AuError> {
    if config.instance.is_empty() {
        return Err(AuError::ErrConfigInstanceNotFound);
    }

    for (name, instance) in &config.instance {
        let invalid = |reason: &str| AuError::ErrConfigInstanceInvalid(name.clone(), reason.to_string());

        if instance.endpoint.is_empty() {
            return Err(invalid("endpoint cannot be empty"));
        }
        if instance.unseal_keys.is_empty() {
            return Err(invalid("at least one unseal key is required"));
        }
        if instance.threshold < 1 {
            return Err(invalid("threshold must be at least 1"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::{env, io::prelude::*};

    use super::*;
    use crate::test_utils::{test_keys, TEST_DIR};

    fn write_file(path: &str, config: &str) -> Result<(), AuError> {
        let mut file = fs::File::create(path)?;

        file.write_all(config.as_bytes())?;

        file.flush()?;

        Ok(())
    }

    #[test]
    fn test_load_config() {
        let dir = env::temp_dir().join(TEST_DIR).join("test_load_config");
        assert!(fs::create_dir(&dir).is_ok());
        let keys = test_keys(3);

        let file_path = dir.join("config.hcl");
        let path = file_path.to_str().unwrap_or("config.hcl");

        let hcl_config_str = format!(
            r#"
            log_level = "debug"
            timeout = "10s"
            retry_delay = "500ms"
            max_concurrency = 2

            instance "vault-0" {{
              endpoint    = "https://vault-0.vault:8200"
              unseal_keys = ["{0}", "{1}", "{2}"]
              tls_skip_verify = "true"
            }}

            instance "vault-1" {{
              endpoint    = "https://vault-1.vault:8200"
              unseal_keys = ["{0}", "{1}"]
              threshold   = 2
            }}
        "#,
            keys[0], keys[1], keys[2]
        );

        assert!(write_file(path, &hcl_config_str).is_ok());

        let config = load_config(path);
        assert!(config.is_ok());
        let hcl_config = config.unwrap();

        let json_config_str = serde_json::json!({
            "log_level": "debug",
            "timeout": "10s",
            "retry_delay": "500ms",
            "max_concurrency": 2,
            "instance": {
                "vault-0": {
                    "endpoint": "https://vault-0.vault:8200",
                    "unseal_keys": [keys[0], keys[1], keys[2]],
                    "tls_skip_verify": true
                },
                "vault-1": {
                    "endpoint": "https://vault-1.vault:8200",
                    "unseal_keys": [keys[0], keys[1]],
                    "threshold": 2
                }
            }
        })
        .to_string();

        let file_path = dir.join("config.json");
        let path = file_path.to_str().unwrap_or("config.json");
        assert!(write_file(path, &json_config_str).is_ok());

        let config = load_config(path);
        assert!(config.is_ok());
        let json_config = config.unwrap();

        let hcl_config_value: Value = serde_json::to_value(&hcl_config).unwrap();
        let json_config_value: Value = serde_json::to_value(&json_config).unwrap();
        assert_eq!(hcl_config_value, json_config_value);

        assert_eq!(json_config.log_level.as_str(), "debug");
        assert_eq!(json_config.timeout, Duration::from_secs(10));
        assert_eq!(json_config.retry_delay, Duration::from_millis(500));
        assert_eq!(json_config.max_retries, 3);
        assert_eq!(json_config.max_concurrency, 2);
        assert_eq!(json_config.interval, Duration::from_secs(30));
        assert!(json_config.strict.is_none());

        let vault_0 = &json_config.instance["vault-0"];
        assert_eq!(vault_0.name, "vault-0");
        assert_eq!(vault_0.threshold, DEFAULT_THRESHOLD);
        assert!(vault_0.tls_skip_verify);
        assert_eq!(vault_0.unseal_keys.len(), 3);

        let vault_1 = &hcl_config.instance["vault-1"];
        assert_eq!(vault_1.threshold, 2);
        assert!(!vault_1.tls_skip_verify);

        let debug = format!("{:?}", hcl_config);
        assert!(!debug.contains(&keys[0]));
        assert!(debug.contains(REDACTED));
    }

    #[test]
    fn test_load_config_dir() {
        let dir = env::temp_dir().join(TEST_DIR).join("test_load_config_dir");
        assert!(fs::create_dir(&dir).is_ok());
        let keys = test_keys(2);

        let file_path = dir.join("config1.hcl");
        let path = file_path.to_str().unwrap_or("config1.hcl");

        let hcl_config_str = r#"
            log_level = "info"
            interval = "1m"

            strict {
              key_length = 4
              forbidden_strings = ["staging"]
            }
        "#;

        assert!(write_file(path, hcl_config_str).is_ok());

        let file_path = dir.join("config2.hcl");
        let path = file_path.to_str().unwrap_or("config2.hcl");

        let hcl_config_str = format!(
            r#"
            max_retries = 5

            instance "vault-0" {{
              endpoint    = "http://127.0.0.1:8200"
              unseal_keys = ["{}", "{}"]
              threshold   = 2
            }}
        "#,
            keys[0], keys[1]
        );

        assert!(write_file(path, &hcl_config_str).is_ok());

        let config = load_config(dir.to_str().unwrap());
        assert!(config.is_ok());
        let hcl_config = config.unwrap();
        assert_eq!(hcl_config.log_level.as_str(), "info");
        assert_eq!(hcl_config.interval, Duration::from_secs(60));
        assert_eq!(hcl_config.max_retries, 5);
        assert_eq!(hcl_config.instance.len(), 1);

        let strict = hcl_config.strict.as_ref().unwrap();
        assert_eq!(strict.key_length, 4);
        assert_eq!(strict.forbidden_strings.as_deref(), Some(&["staging".to_string()][..]));

        let validator = hcl_config.validator();
        assert!(validator.validate_keys(&keys, 2).is_ok());
        assert!(validator.validate_keys(&test_keys(2)[..1], 2).is_err());

        let client_config = hcl_config.client_config(&hcl_config.instance["vault-0"]);
        assert_eq!(client_config.url, "http://127.0.0.1:8200");
        assert_eq!(client_config.max_retries, 5);
        assert!(client_config.validate().is_ok());
    }

    #[test]
    fn test_load_config_invalid() {
        let dir = env::temp_dir().join(TEST_DIR).join("test_load_config_invalid");
        assert!(fs::create_dir(&dir).is_ok());

        assert!(matches!(load_config("/nonexistent/autounseal.hcl"), Err(AuError::ErrConfigPathInvalid)));

        let file_path = dir.join("empty.hcl");
        let path = file_path.to_str().unwrap_or("empty.hcl");
        assert!(write_file(path, r#"log_level = "warn""#).is_ok());
        assert!(matches!(load_config(path), Err(AuError::ErrConfigInstanceNotFound)));

        let file_path = dir.join("no_keys.hcl");
        let path = file_path.to_str().unwrap_or("no_keys.hcl");
        let hcl_config_str = r#"
            instance "vault-0" {
              endpoint = "http://127.0.0.1:8200"
            }
        "#;
        assert!(write_file(path, hcl_config_str).is_ok());
        match load_config(path) {
            Err(AuError::ErrConfigInstanceInvalid(name, reason)) => {
                assert_eq!(name, "vault-0");
                assert!(reason.contains("unseal key"));
            }
            other => panic!("unexpected result: {:?}", other.map(|c| c.instance.len())),
        }

        let file_path = dir.join("zero_threshold.json");
        let path = file_path.to_str().unwrap_or("zero_threshold.json");
        let json_config_str = r#"{"instance": {"vault-0": {"endpoint": "http://127.0.0.1:8200", "unseal_keys": ["AQIDBA=="], "threshold": 0}}}"#;
        assert!(write_file(path, json_config_str).is_ok());
        assert!(matches!(load_config(path), Err(AuError::ErrConfigInstanceInvalid(..))));

        let file_path = dir.join("config.yaml");
        let path = file_path.to_str().unwrap_or("config.yaml");
        assert!(write_file(path, "instance: {}").is_ok());
        assert!(matches!(load_config(path), Err(AuError::ErrConfigPathInvalid)));
    }
}
