//! Runtime configuration read from the environment (and `.env`).

use anyhow::{Context, Result, bail};
use std::env;
use std::path::PathBuf;

use crate::constants::{DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT, LOCAL_CONFIG_DIR};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage: StorageConfig,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

/// Where file data and the config blob live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Local {
        data_path: PathBuf,
        config_path: PathBuf,
    },
    Gcs {
        data_bucket: String,
        config_bucket: String,
    },
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => DEFAULT_PORT,
        };

        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("MAX_UPLOAD_BYTES must be a byte count, got {raw:?}"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let storage = if let Some(data_path) = var("LOCAL_STORAGE_PATH").map(PathBuf::from) {
            let config_path = var("LOCAL_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_path.join(LOCAL_CONFIG_DIR));
            StorageConfig::Local {
                data_path,
                config_path,
            }
        } else {
            // GCLOUD_* names are accepted as aliases
            let Some(data_bucket) = var("GCS_DATA_BUCKET").or_else(|| var("GCLOUD_BUCKET")) else {
                bail!("set LOCAL_STORAGE_PATH or GCS_DATA_BUCKET");
            };
            let config_bucket = var("GCS_CONFIG_BUCKET")
                .or_else(|| var("GCLOUD_CONFIG_BUCKET"))
                .unwrap_or_else(|| data_bucket.clone());
            StorageConfig::Gcs {
                data_bucket,
                config_bucket,
            }
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_default();

        Ok(Config {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            storage,
            allowed_origins,
            max_upload_bytes,
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if origins.iter().any(|o| o == "*") {
        Vec::new()
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_local_storage_defaults() {
        let config = config_from(&[("LOCAL_STORAGE_PATH", "/srv/data")]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(
            config.storage,
            StorageConfig::Local {
                data_path: PathBuf::from("/srv/data"),
                config_path: PathBuf::from("/srv/data/.config"),
            }
        );
    }

    #[test]
    fn test_gcs_buckets_with_legacy_names() {
        let config = config_from(&[
            ("GCLOUD_BUCKET", "choir-data"),
            ("GCLOUD_CONFIG_BUCKET", "choir-config"),
            ("PORT", "8080"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.storage,
            StorageConfig::Gcs {
                data_bucket: "choir-data".into(),
                config_bucket: "choir-config".into(),
            }
        );
    }

    #[test]
    fn test_config_bucket_falls_back_to_data_bucket() {
        let config = config_from(&[("GCS_DATA_BUCKET", "data")]).unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Gcs {
                data_bucket: "data".into(),
                config_bucket: "data".into(),
            }
        );
    }

    #[test]
    fn test_missing_storage_is_an_error() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("LOCAL_STORAGE_PATH", "  ")]).is_err());
    }

    #[test]
    fn test_bad_port_is_an_error() {
        assert!(config_from(&[("LOCAL_STORAGE_PATH", "/d"), ("PORT", "http")]).is_err());
    }

    #[test]
    fn test_origin_list_parsing() {
        assert_eq!(
            parse_origins("http://localhost:3000, https://choir.example.app/"),
            vec!["http://localhost:3000", "https://choir.example.app"]
        );
        assert!(parse_origins("*").is_empty());
        assert!(parse_origins(" , ").is_empty());
    }
}
