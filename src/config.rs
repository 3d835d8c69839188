//! Configuration management for the SSE-C gateway

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transfer::{DEFAULT_CONCURRENCY, MIN_PART_SIZE};

// Sample key pair; replace in any real deployment
const DEFAULT_SSE_KEY_BASE64: &str = "pWLFFPtkS6tdlfYdPLB7VnTNUynI+xWjWPU+3uUKub4=";
const DEFAULT_SSE_KEY_MD5_BASE64: &str = "kGbzQ9GzucxsX+i6c8nK6A==";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub encryption: EncryptionConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    pub credentials: CredentialMode,
    pub region: String,
    pub bucket: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Bound on instance-metadata credential resolution
    pub credential_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    S3,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(StoreBackend::S3),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// How the store client obtains credentials
#[derive(Clone)]
pub enum CredentialMode {
    Static {
        access_key: String,
        secret_key: String,
    },
    /// Instance role credentials from the metadata service
    InstanceRole,
}

impl fmt::Debug for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialMode::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
            CredentialMode::InstanceRole => f.write_str("InstanceRole"),
        }
    }
}

#[derive(Clone)]
pub struct EncryptionConfig {
    pub key_base64: String,
    pub key_md5_base64: String,
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key_base64", &"<redacted>")
            .field("key_md5_base64", &self.key_md5_base64)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub part_size: usize,
    pub concurrency: usize,
    /// Request body limit for uploads; `None` disables the limit
    pub max_upload_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                backend: StoreBackend::S3,
                credentials: CredentialMode::Static {
                    access_key: String::new(),
                    secret_key: String::new(),
                },
                region: "us-east-1".to_string(),
                bucket: "s3-sse-c-sample".to_string(),
                endpoint: None,
                force_path_style: false,
                credential_timeout: Duration::from_secs(10),
            },
            encryption: EncryptionConfig {
                key_base64: DEFAULT_SSE_KEY_BASE64.to_string(),
                key_md5_base64: DEFAULT_SSE_KEY_MD5_BASE64.to_string(),
            },
            transfer: TransferConfig {
                part_size: MIN_PART_SIZE,
                concurrency: DEFAULT_CONCURRENCY,
                max_upload_bytes: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let use_access_key: bool = parse_or(&var, "S3_USE_ACCESS_KEY", true)?;
        let credentials = if use_access_key {
            CredentialMode::Static {
                access_key: var("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: var("S3_SECRET_KEY").unwrap_or_default(),
            }
        } else {
            CredentialMode::InstanceRole
        };

        let part_size: usize = parse_or(&var, "TRANSFER_PART_SIZE", defaults.transfer.part_size)?;
        if part_size < MIN_PART_SIZE {
            return Err(ConfigError::InvalidValue {
                name: "TRANSFER_PART_SIZE",
                reason: format!("must be at least {} bytes", MIN_PART_SIZE),
            });
        }

        let concurrency: usize =
            parse_or(&var, "TRANSFER_CONCURRENCY", defaults.transfer.concurrency)?;
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "TRANSFER_CONCURRENCY",
                reason: "must be at least 1".to_string(),
            });
        }

        let max_upload_bytes = match var("TRANSFER_MAX_UPLOAD_BYTES") {
            Some(raw) => Some(parse_value("TRANSFER_MAX_UPLOAD_BYTES", &raw)?),
            None => None,
        };

        let credential_timeout_secs: u64 = parse_or(
            &var,
            "CREDENTIAL_TIMEOUT_SECS",
            defaults.storage.credential_timeout.as_secs(),
        )?;

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_or(&var, "SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                backend: parse_or(&var, "STORE_BACKEND", defaults.storage.backend)?,
                credentials,
                region: var("S3_REGION").unwrap_or(defaults.storage.region),
                bucket: var("S3_BUCKET").unwrap_or(defaults.storage.bucket),
                endpoint: var("S3_ENDPOINT"),
                force_path_style: parse_or(
                    &var,
                    "S3_FORCE_PATH_STYLE",
                    defaults.storage.force_path_style,
                )?,
                credential_timeout: Duration::from_secs(credential_timeout_secs),
            },
            encryption: EncryptionConfig {
                key_base64: var("SSE_CUSTOMER_KEY_BASE64")
                    .unwrap_or(defaults.encryption.key_base64),
                key_md5_base64: var("SSE_CUSTOMER_KEY_MD5_BASE64")
                    .unwrap_or(defaults.encryption.key_md5_base64),
            },
            transfer: TransferConfig {
                part_size,
                concurrency,
                max_upload_bytes,
            },
        })
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name,
        reason: format!("'{}': {}", raw, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StoreBackend::S3);
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.bucket, "s3-sse-c-sample");
        assert!(matches!(config.storage.credentials, CredentialMode::Static { .. }));
        assert_eq!(config.transfer.part_size, 5 * 1024 * 1024);
        assert_eq!(config.transfer.concurrency, 1);
        assert!(config.transfer.max_upload_bytes.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_PORT", "9090"),
            ("STORE_BACKEND", "memory"),
            ("S3_USE_ACCESS_KEY", "false"),
            ("S3_BUCKET", "vault"),
            ("S3_ENDPOINT", "http://localhost:9000"),
            ("TRANSFER_CONCURRENCY", "4"),
            ("TRANSFER_MAX_UPLOAD_BYTES", "1048576"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.backend, StoreBackend::Memory);
        assert!(matches!(config.storage.credentials, CredentialMode::InstanceRole));
        assert_eq!(config.storage.bucket, "vault");
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.transfer.concurrency, 4);
        assert_eq!(config.transfer.max_upload_bytes, Some(1_048_576));
    }

    #[test]
    fn test_part_size_below_store_minimum_is_rejected() {
        let err = Config::from_lookup(lookup(&[("TRANSFER_PART_SIZE", "1024")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "TRANSFER_PART_SIZE", .. }));
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = Config::from_lookup(lookup(&[("SERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "SERVER_PORT", .. }));

        let err = Config::from_lookup(lookup(&[("STORE_BACKEND", "gcs")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "STORE_BACKEND", .. }));
    }

    #[test]
    fn test_secrets_are_redacted() {
        let config = Config::from_lookup(lookup(&[
            ("S3_ACCESS_KEY", "AKIDEXAMPLE"),
            ("S3_SECRET_KEY", "very-secret"),
        ]))
        .unwrap();

        let rendered = format!("{:?}", config);
        assert!(rendered.contains("AKIDEXAMPLE"));
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains(DEFAULT_SSE_KEY_BASE64));
    }
}
