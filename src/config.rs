use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::db::connection::RetryPolicy;
use crate::db::tls::{TlsConfig, TlsMode};
use crate::error::{ReconcileError, Result};

pub const CONFIG_FILE_NAME: &str = "pgreconcile.toml";
pub const SAMPLE_CONFIG_FILE_NAME: &str = "pgreconcile.toml.example";

/// Settings from `pgreconcile.toml`; connection parameters come from the environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Connection attempts before giving up
    pub max_connect_attempts: Option<u32>,

    /// Delay after the first failed attempt; doubles on each retry
    pub initial_backoff_ms: Option<u64>,

    /// Upper bound for the retry delay
    pub max_backoff_ms: Option<u64>,

    /// Per-statement timeout for the session, 0 disables it
    pub statement_timeout_ms: Option<u64>,

    /// TLS/SSL configuration
    pub tls: Option<TlsConfigSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfigSection {
    /// SSL mode (disable, prefer, require, verify-ca, verify-full)
    pub sslmode: Option<String>,

    /// Path to root certificate file for server verification
    pub sslrootcert: Option<PathBuf>,

    /// Path to client certificate file
    pub sslcert: Option<PathBuf>,

    /// Path to client key file
    pub sslkey: Option<PathBuf>,
}

impl ReconcileConfig {
    /// Load `pgreconcile.toml` from the current directory, if present
    pub fn load_from_file() -> Result<Option<Self>> {
        Self::load_from_path(Path::new(CONFIG_FILE_NAME))
    }

    pub fn load_from_path(config_path: &Path) -> Result<Option<Self>> {
        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(config_path).map_err(|e| ReconcileError::ConfigLoad {
            path: config_path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: ReconcileConfig = toml::from_str(&content).map_err(|e| ReconcileError::ConfigLoad {
            path: config_path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Some(config))
    }

    /// Write a commented starting point into `dir`; returns the file written
    pub fn write_sample_config(dir: &Path) -> Result<PathBuf> {
        let defaults = RetryPolicy::default();
        let sample_config = ReconcileConfig {
            max_connect_attempts: Some(defaults.max_attempts),
            initial_backoff_ms: Some(defaults.initial_backoff.as_millis() as u64),
            max_backoff_ms: Some(defaults.max_backoff.as_millis() as u64),
            statement_timeout_ms: Some(30_000),
            tls: Some(TlsConfigSection {
                sslmode: Some("disable".to_string()),
                sslrootcert: None,
                sslcert: None,
                sslkey: None,
            }),
        };

        let body = toml::to_string_pretty(&sample_config)
            .map_err(|e| ReconcileError::Other(format!("Failed to render sample config: {}", e)))?;
        let content = format!(
            "# Connection parameters are read from the environment:\n\
             # DATABASE_URL, or DB_HOST / DB_PORT / DB_USER / DB_PASSWORD / DB_NAME,\n\
             # DB_SSLMODE, and APP_ENV=production to require an encrypted connection.\n\n{}",
            body
        );

        let path = dir.join(SAMPLE_CONFIG_FILE_NAME);
        fs::write(&path, content).map_err(|e| ReconcileError::FileWrite {
            path: path.clone(),
            message: e.to_string(),
            source: e,
        })?;

        Ok(path)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_connect_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: self
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            max_backoff: self
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
        }
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Build TLS configuration from the config
    pub fn build_tls_config(&self) -> Result<TlsConfig> {
        let mut tls_config = TlsConfig::default();

        if let Some(tls_section) = &self.tls {
            if let Some(sslmode) = &tls_section.sslmode {
                tls_config.mode = TlsMode::from_str(sslmode)?;
            }

            if let Some(root_cert) = &tls_section.sslrootcert {
                tls_config.root_cert = Some(root_cert.to_string_lossy().to_string());
            }

            if let Some(client_cert) = &tls_section.sslcert {
                tls_config.client_cert = Some(client_cert.to_string_lossy().to_string());
            }

            if let Some(client_key) = &tls_section.sslkey {
                tls_config.client_key = Some(client_key.to_string_lossy().to_string());
            }
        }

        Ok(tls_config)
    }
}
