//! notifyfwd Core - Shared types and wire definitions
//!
//! This crate provides the configuration, error type and HTTP payloads used by
//! both the pairing client and the receiver.

pub mod config;
pub mod error;
pub mod protocol;

pub use config::{Config, APP_NAME, DEFAULT_REQUIRED_VERSION};
pub use error::{Error, Result};
pub use protocol::{NotifyRequest, VersionResponse, NOTIFY_PATH, VERSION_PATH};
