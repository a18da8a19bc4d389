//! Persistent storage for the confirmed receiver address
//!
//! Uses JSON file storage in ~/.config/notifyfwd/server.json

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration directory not found")]
    NoConfigDir,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Where a confirmed receiver address is kept
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Replace the stored address
    async fn save_server_address(&self, address: &str) -> StorageResult<()>;

    /// The stored address, if any
    async fn server_address(&self) -> Option<String>;

    /// Forget the stored address
    async fn clear(&self) -> StorageResult<()>;
}

/// Stored data structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredData {
    server_address: Option<String>,
    saved_at: Option<DateTime<Utc>>,
}

/// Address storage with file persistence
pub struct FileAddressStore {
    /// Path to the storage file
    path: PathBuf,
    /// In-memory copy of the file
    data: RwLock<StoredData>,
}

impl FileAddressStore {
    /// Open the store at the default location
    pub async fn new() -> StorageResult<Self> {
        let path = Self::default_path()?;
        Self::with_path(path).await
    }

    /// Open the store at a specific path
    pub async fn with_path(path: PathBuf) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str(&contents) {
                Ok(data) => {
                    info!("Loaded server settings from {:?}", path);
                    data
                }
                Err(e) => {
                    warn!("Failed to parse server settings, starting fresh: {}", e);
                    StoredData::default()
                }
            }
        } else {
            debug!("No existing server settings, creating new");
            StoredData::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Get the default storage path (~/.config/notifyfwd/server.json)
    pub fn default_path() -> StorageResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(config_dir.join("notifyfwd").join("server.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the current address was confirmed
    pub async fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.data.read().await.saved_at
    }

    async fn save(&self, data: &StoredData) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&self.path, json).await?;
        debug!("Saved server settings to {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl AddressStore for FileAddressStore {
    async fn save_server_address(&self, address: &str) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.server_address = Some(address.to_string());
        data.saved_at = Some(Utc::now());
        self.save(&data).await?;
        info!("Saved server address {}", address);
        Ok(())
    }

    async fn server_address(&self) -> Option<String> {
        self.data.read().await.server_address.clone()
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut data = self.data.write().await;
        *data = StoredData::default();
        self.save(&data).await?;
        info!("Cleared server address");
        Ok(())
    }
}
