//! Receiver version check
//!
//! Before any code is sent, the receiver must report exactly the version this
//! client was built against. Every failure mode collapses into a non-compatible
//! outcome; nothing here returns an error.

use crate::address::endpoint;
use crate::http::build_client;
use async_trait::async_trait;
use notifyfwd_core::{Config, Result, VERSION_PATH};
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Result of probing a receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Receiver reported the required version
    Compatible,
    /// Receiver answered 200 but with another version (empty if the body was unusable)
    Mismatch { reported: String },
    /// Network error, timeout or non-200 status
    Unreachable { reason: String },
}

impl ProbeOutcome {
    pub fn is_compatible(&self) -> bool {
        matches!(self, ProbeOutcome::Compatible)
    }
}

/// Checks whether a receiver speaks the required version
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn probe(&self, base_url: &str) -> ProbeOutcome;

    /// Boolean form of [`VersionProbe::probe`]
    async fn check_version(&self, base_url: &str) -> bool {
        self.probe(base_url).await.is_compatible()
    }
}

/// Probe that issues `GET {base}/api/version`
pub struct HttpVersionProbe {
    client: reqwest::Client,
    required_version: String,
}

impl HttpVersionProbe {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            required_version: config.required_version.clone(),
        })
    }
}

#[async_trait]
impl VersionProbe for HttpVersionProbe {
    async fn probe(&self, base_url: &str) -> ProbeOutcome {
        let url = endpoint(base_url, VERSION_PATH);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Version probe to {} failed: {}", url, e);
                return ProbeOutcome::Unreachable {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Version probe to {} returned {}", url, status);
            return ProbeOutcome::Unreachable {
                reason: format!("status {}", status),
            };
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read version response from {}: {}", url, e);
                return ProbeOutcome::Unreachable {
                    reason: e.to_string(),
                };
            }
        };

        let reported = parse_version(&body);
        debug!(
            "Receiver at {} reports version {:?} (required {:?})",
            base_url, reported, self.required_version
        );

        if reported == self.required_version {
            ProbeOutcome::Compatible
        } else {
            ProbeOutcome::Mismatch { reported }
        }
    }
}

/// Extract the `version` string field, or empty if the body is unusable
fn parse_version(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("version")?.as_str().map(str::to_string))
        .unwrap_or_default()
}
