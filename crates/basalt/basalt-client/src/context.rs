//! Client configuration.
//!
//! [`Context`] is the programmatic surface handed to
//! [`crate::BasaltClient::connect`]; [`ContextConfig`] is the on-disk TOML
//! subset (paths and timeouts) with per-field defaults.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error};

use crate::{ClientError, IdleStrategy, Image, SleepingIdleStrategy};

pub type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;
pub type AvailableImageHandler = Arc<dyn Fn(&Image) + Send + Sync>;
pub type UnavailableImageHandler = Arc<dyn Fn(&Image) + Send + Sync>;

#[derive(Clone)]
pub struct Context {
    /// Path of the CnC file the media driver exposes.
    pub cnc_file_name: String,

    /// How long a registration may await a driver response.
    pub media_driver_timeout: Duration,

    /// Grace period a publication stays connected without subscriber
    /// activity. Reserved for the send path; carried through unchanged.
    pub publication_connection_timeout: Duration,

    /// Grace period between resource retirement and final unmap, so
    /// in-flight readers can drain.
    pub resource_linger_timeout: Duration,

    /// Interval between client keepalives to the driver.
    pub keepalive_interval: Duration,

    pub idle_strategy: Arc<dyn IdleStrategy>,
    pub error_handler: ErrorHandler,
    pub available_image_handler: AvailableImageHandler,
    pub unavailable_image_handler: UnavailableImageHandler,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            cnc_file_name: defaults::cnc_file_name(),
            media_driver_timeout: Duration::from_millis(defaults::media_driver_timeout_ms()),
            publication_connection_timeout: Duration::from_millis(
                defaults::publication_connection_timeout_ms(),
            ),
            resource_linger_timeout: Duration::from_millis(defaults::resource_linger_timeout_ms()),
            keepalive_interval: Duration::from_millis(defaults::keepalive_interval_ms()),
            idle_strategy: Arc::new(SleepingIdleStrategy::new(Duration::from_millis(1))),
            error_handler: Arc::new(|err| error!("client error: {err}")),
            available_image_handler: Arc::new(|image| {
                debug!(
                    correlation_id = image.correlation_id(),
                    session_id = image.session_id(),
                    "image available"
                )
            }),
            unavailable_image_handler: Arc::new(|image| {
                debug!(correlation_id = image.correlation_id(), "image unavailable")
            }),
        }
    }
}

impl Context {
    /// Applies a file-loaded configuration on top of the defaults. Handlers
    /// and the idle strategy stay programmatic.
    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            cnc_file_name: config.cnc_file_name.clone(),
            media_driver_timeout: Duration::from_millis(config.media_driver_timeout_ms),
            publication_connection_timeout: Duration::from_millis(
                config.publication_connection_timeout_ms,
            ),
            resource_linger_timeout: Duration::from_millis(config.resource_linger_timeout_ms),
            keepalive_interval: Duration::from_millis(config.keepalive_interval_ms),
            ..Self::default()
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ContextConfig {
    #[serde(default = "defaults::cnc_file_name")]
    pub cnc_file_name: String,
    #[serde(default = "defaults::media_driver_timeout_ms")]
    pub media_driver_timeout_ms: u64,
    #[serde(default = "defaults::publication_connection_timeout_ms")]
    pub publication_connection_timeout_ms: u64,
    #[serde(default = "defaults::resource_linger_timeout_ms")]
    pub resource_linger_timeout_ms: u64,
    #[serde(default = "defaults::keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn cnc_file_name() -> String {
        "/dev/shm/basalt/cnc.dat".into()
    }

    pub fn media_driver_timeout_ms() -> u64 {
        10_000
    }

    pub fn publication_connection_timeout_ms() -> u64 {
        5_000
    }

    pub fn resource_linger_timeout_ms() -> u64 {
        3_000
    }

    pub fn keepalive_interval_ms() -> u64 {
        500
    }
}

impl ContextConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: ContextConfig = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: ContextConfig = toml::from_str("media_driver_timeout_ms = 250").unwrap();
        assert_eq!(config.media_driver_timeout_ms, 250);
        assert_eq!(config.cnc_file_name, "/dev/shm/basalt/cnc.dat");
        assert_eq!(config.keepalive_interval_ms, 500);

        let context = Context::from_config(&config);
        assert_eq!(context.media_driver_timeout, Duration::from_millis(250));
        assert_eq!(context.resource_linger_timeout, Duration::from_millis(3_000));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ContextConfig::load("/tmp/basalt_no_such_config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
