//! Settings types.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamfan_core::Credentials;

use crate::errors::{Result, SettingsError};

/// Default for [`FanoutSettings::event_buffer`].
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default for [`FanoutSettings::default_poll_interval_ms`].
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Root settings object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FanoutSettings {
    /// Default tracing filter (overridden by `RUST_LOG`).
    pub log_level: String,
    /// Capacity of each transport's event channel.
    pub event_buffer: usize,
    /// Interval used by polling listeners that do not specify one.
    pub default_poll_interval_ms: u64,
    /// Endpoints to create at startup, in creation order.
    pub endpoints: Vec<EndpointSettings>,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            default_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            endpoints: Vec::new(),
        }
    }
}

impl FanoutSettings {
    /// Install the global tracing subscriber at [`FanoutSettings::log_level`].
    ///
    /// `RUST_LOG` still wins when set. Later calls are no-ops.
    pub fn init_logging(&self) {
        streamfan_core::logging::init_subscriber(&self.log_level);
    }

    /// Default polling interval as a [`Duration`].
    pub fn default_poll_interval(&self) -> Duration {
        Duration::from_millis(self.default_poll_interval_ms)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "eventBuffer must be at least 1".into(),
            ));
        }
        if self.default_poll_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "defaultPollIntervalMs must be at least 1".into(),
            ));
        }
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.is_empty() {
                return Err(SettingsError::InvalidValue(
                    "endpoint name must not be empty".into(),
                ));
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(SettingsError::InvalidValue(format!(
                    "duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
        }
        Ok(())
    }
}

/// One named endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSettings {
    /// Unique endpoint name.
    pub name: String,
    /// Port passed to `listen`.
    #[serde(default)]
    pub port: u16,
    /// Respond to each arriving stream before listeners run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_respond: Option<AutoRespond>,
    /// Serve TLS with these files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
}

/// Status and content type sent to every arriving stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoRespond {
    /// Response status.
    pub status: u16,
    /// Value of the `content-type` header.
    pub content_type: String,
}

impl Default for AutoRespond {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: "text/plain".to_string(),
        }
    }
}

/// Paths of PEM files for a secure endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSettings {
    /// Private key file.
    pub key_path: PathBuf,
    /// Certificate chain file.
    pub cert_path: PathBuf,
}

impl TlsSettings {
    /// Read both files into [`Credentials`].
    pub fn load(&self) -> Result<Credentials> {
        let key = read_pem(&self.key_path)?;
        let cert = read_pem(&self.cert_path)?;
        Ok(Credentials::new(key, cert))
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| SettingsError::TlsFile {
        path: path.to_path_buf(),
        source,
    })
}
