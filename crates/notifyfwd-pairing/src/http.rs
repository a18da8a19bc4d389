//! Shared HTTP client construction

use notifyfwd_core::{Config, Result};

/// Build a client with the configured connect and read timeouts
pub fn build_client(config: &Config) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .build()?;
    Ok(client)
}
