//! Configuration types for notifyfwd

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application name announced in every notify payload
pub const APP_NAME: &str = "NotifyForwarders";

/// Receiver version this client speaks
pub const DEFAULT_REQUIRED_VERSION: &str = "1.0";

/// Main configuration for notifyfwd
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Version string the receiver must report from `/api/version`
    pub required_version: String,
    /// Model identifier of this device, shown by the receiver
    pub device_name: String,
    /// Application name sent as `appname`
    pub app_name: String,
    /// TCP connect timeout for each HTTP call
    pub connect_timeout: Duration,
    /// Read timeout for each HTTP call
    pub read_timeout: Duration,
    /// How long a successful confirmation stays visible before the session resets
    pub confirm_close_delay: Duration,
    /// Maximum age of an outstanding challenge (no expiry if None)
    pub challenge_ttl: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            required_version: DEFAULT_REQUIRED_VERSION.to_string(),
            device_name: "unknown".to_string(),
            app_name: APP_NAME.to_string(),
            connect_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(5000),
            confirm_close_delay: Duration::from_millis(1500),
            challenge_ttl: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set required receiver version
    pub fn with_required_version(mut self, version: impl Into<String>) -> Self {
        self.required_version = version.into();
        self
    }

    /// Builder pattern: set device name
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Builder pattern: set both HTTP timeouts
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Builder pattern: set the post-confirmation display delay
    pub fn with_confirm_close_delay(mut self, delay: Duration) -> Self {
        self.confirm_close_delay = delay;
        self
    }

    /// Builder pattern: set challenge expiry
    pub fn with_challenge_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.challenge_ttl = ttl;
        self
    }
}
