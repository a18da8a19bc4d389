//! Delivery of the verification code to the receiver
//!
//! The code travels as an ordinary notification so the receiver's operator sees
//! it on screen and can type it back on this device.

use crate::address::endpoint;
use crate::http::build_client;
use async_trait::async_trait;
use notifyfwd_core::{Config, NotifyRequest, Result, NOTIFY_PATH};
use reqwest::StatusCode;
use tracing::{info, warn};

/// Notification title shown with the code
pub const CHALLENGE_TITLE: &str = "Request to connect with this device";

/// Sends a challenge code to a receiver
#[async_trait]
pub trait ChallengeDispatcher: Send + Sync {
    /// Returns true iff the receiver accepted the notification with status 200
    async fn dispatch(&self, base_url: &str, code: &str) -> bool;
}

/// Notification body carrying `code`
pub fn challenge_request(device_name: &str, app_name: &str, code: &str) -> NotifyRequest {
    NotifyRequest::new(
        device_name,
        app_name,
        CHALLENGE_TITLE,
        format!("Enter this verification code on your phone: {}", code),
    )
}

/// Dispatcher that issues `POST {base}/api/notify`
pub struct HttpChallengeDispatcher {
    client: reqwest::Client,
    device_name: String,
    app_name: String,
}

impl HttpChallengeDispatcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            device_name: config.device_name.clone(),
            app_name: config.app_name.clone(),
        })
    }
}

#[async_trait]
impl ChallengeDispatcher for HttpChallengeDispatcher {
    async fn dispatch(&self, base_url: &str, code: &str) -> bool {
        let url = endpoint(base_url, NOTIFY_PATH);
        let body = challenge_request(&self.device_name, &self.app_name, code);

        match self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => {
                info!("Verification code delivered to {}", base_url);
                true
            }
            Ok(response) => {
                warn!("Notify to {} returned {}", url, response.status());
                false
            }
            Err(e) => {
                warn!("Notify to {} failed: {}", url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn dispatcher() -> HttpChallengeDispatcher {
        HttpChallengeDispatcher::new(&Config::new().with_device_name("Pixel 8")).unwrap()
    }

    #[test]
    fn test_challenge_request_embeds_code() {
        let request = challenge_request("Pixel 8", "NotifyForwarders", "012345");
        assert_eq!(request.title, CHALLENGE_TITLE);
        assert!(request.description.contains("012345"));
        assert_eq!(request.devicename, "Pixel 8");
        assert_eq!(request.appname, "NotifyForwarders");
    }

    #[tokio::test]
    async fn test_dispatch_sends_documented_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/notify")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({
                "devicename": "Pixel 8",
                "appname": "NotifyForwarders",
                "title": "Request to connect with this device",
                "description": "Enter this verification code on your phone: 987654",
            })))
            .with_status(200)
            .create_async()
            .await;

        assert!(dispatcher().dispatch(&server.url(), "987654").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_dispatch_non_200_is_false() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/notify")
            .with_status(204)
            .create_async()
            .await;

        assert!(!dispatcher().dispatch(&server.url(), "111111").await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_dispatch_server_error_is_false() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/notify")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        assert!(!dispatcher().dispatch(&server.url(), "111111").await);
    }

    #[tokio::test]
    async fn test_dispatch_network_error_is_false() {
        assert!(!dispatcher().dispatch("http://127.0.0.1:1", "111111").await);
    }
}
