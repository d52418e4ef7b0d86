//! Credential persistence abstraction.
//!
//! The bearer token survives client restarts in a durable local key-value
//! store. The concrete implementation is a small JSON file keyed by
//! [`TOKEN_STORAGE_KEY`]; tests use the in-memory variant.

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ClientError;

/// Fixed key the token is persisted under.
pub const TOKEN_STORAGE_KEY: &str = "jwt_token";

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the persisted token, if any. Absence means login is required.
    async fn load(&self) -> Result<Option<String>, ClientError>;

    /// Persist a freshly issued token, replacing any previous one.
    async fn save(&self, token: &str) -> Result<(), ClientError>;

    /// Remove the persisted token.
    async fn clear(&self) -> Result<(), ClientError>;
}

/// JSON-file-backed store.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_map(&self) -> Result<Map<String, Value>, ClientError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| ClientError::token_store(format!("corrupt store file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(ClientError::token_store(e.to_string())),
        }
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::token_store(e.to_string()))?;
        }
        let raw = serde_json::to_vec_pretty(map)
            .map_err(|e| ClientError::token_store(e.to_string()))?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| ClientError::token_store(e.to_string()))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<String>, ClientError> {
        let map = self.read_map().await?;
        Ok(map
            .get(TOKEN_STORAGE_KEY)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        let mut map = self.read_map().await?;
        map.insert(TOKEN_STORAGE_KEY.to_string(), Value::from(token));
        self.write_map(&map).await?;
        debug!(path = %self.path.display(), "persisted session token");
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        let mut map = self.read_map().await?;
        if map.remove(TOKEN_STORAGE_KEY).is_some() {
            self.write_map(&map).await?;
            debug!(path = %self.path.display(), "cleared persisted session token");
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<String>, ClientError> {
        Ok(self.token.lock().clone())
    }

    async fn save(&self, token: &str) -> Result<(), ClientError> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), ClientError> {
        *self.token.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("session.json"));

        assert_eq!(store.load().await.unwrap(), None);

        store.save("tok-1").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("tok-1"));

        store.save("tok-2").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("tok-2"));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_on_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.json"));
        store.clear().await.unwrap();
    }
}
