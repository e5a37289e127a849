//! Configuration loading and validation for the spacecat binary.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::server::Limits;

/// Validated server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the PEM-encoded TLS certificate chain. **Required.**
    pub tls_cert_path: String,

    /// Path to the PEM-encoded TLS private key. **Required.**
    pub tls_key_path: String,

    /// TCP port the server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Bytes kept from a request line; the rest is dropped.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Seconds a client has to complete the TLS handshake and send its request line.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Seconds the handler chain may run, reading the upload body included.
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_secs: u64,

    /// Largest Titan upload accepted, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Total bytes the in-memory capsule may hold across all pages.
    #[serde(default = "default_capsule_max_bytes")]
    pub capsule_max_bytes: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Token every Titan upload must carry.
    #[serde(default)]
    pub titan_require_token: Option<String>,

    /// SHA-256 fingerprint of the only client certificate allowed to upload.
    #[serde(default)]
    pub titan_require_cert_fingerprint: Option<String>,
}

fn default_listen_port() -> u16 {
    1965
}
fn default_max_request_bytes() -> usize {
    protocol::MAX_REQUEST_BYTES
}
fn default_request_timeout() -> u64 {
    30
}
fn default_handler_timeout() -> u64 {
    60
}
fn default_max_upload_bytes() -> u64 {
    crate::server::DEFAULT_MAX_UPLOAD_BYTES
}
fn default_capsule_max_bytes() -> u64 {
    crate::capsule::DEFAULT_MAX_BYTES
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.tls_cert_path, "TLS_CERT_PATH")?;
        ensure_non_empty(&self.tls_key_path, "TLS_KEY_PATH")?;

        if self.max_request_bytes == 0 {
            anyhow::bail!("MAX_REQUEST_BYTES must be > 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be > 0");
        }
        if self.handler_timeout_secs == 0 {
            anyhow::bail!("HANDLER_TIMEOUT_SECS must be > 0");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_BYTES must be > 0");
        }
        if self.capsule_max_bytes < self.max_upload_bytes {
            anyhow::bail!("CAPSULE_MAX_BYTES must be >= MAX_UPLOAD_BYTES");
        }
        Ok(())
    }

    pub fn tls_cert_path(&self) -> &Path {
        Path::new(&self.tls_cert_path)
    }

    pub fn tls_key_path(&self) -> &Path {
        Path::new(&self.tls_key_path)
    }

    /// Per-connection limits for the dispatcher.
    pub fn limits(&self) -> Limits {
        Limits {
            max_request_bytes: self.max_request_bytes,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            handler_timeout: Duration::from_secs(self.handler_timeout_secs),
            max_upload_bytes: self.max_upload_bytes,
        }
    }

    /// The upload token, if one is configured. Blank values count as unset.
    pub fn titan_token(&self) -> Option<&str> {
        non_blank(self.titan_require_token.as_deref())
    }

    /// The pinned uploader fingerprint, if one is configured. Blank values count as unset.
    pub fn titan_fingerprint(&self) -> Option<&str> {
        non_blank(self.titan_require_cert_fingerprint.as_deref())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
