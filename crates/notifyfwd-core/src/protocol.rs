//! HTTP payloads exchanged between the forwarder and the receiver

use serde::{Deserialize, Serialize};

/// Path of the version endpoint
pub const VERSION_PATH: &str = "/api/version";

/// Path of the notify endpoint
pub const NOTIFY_PATH: &str = "/api/notify";

/// Body of a `GET /api/version` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    /// Receiver protocol version
    #[serde(default)]
    pub version: String,
}

/// Body of a `POST /api/notify` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRequest {
    /// Model identifier of the sending device
    pub devicename: String,
    /// Application that produced the notification
    pub appname: String,
    pub title: String,
    pub description: String,
}

impl NotifyRequest {
    pub fn new(
        devicename: impl Into<String>,
        appname: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            devicename: devicename.into(),
            appname: appname.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}
