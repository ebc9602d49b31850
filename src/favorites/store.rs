use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{StoreError, TEARDOWN_SIGNATURE};
use crate::models::{FavoriteEntry, FavoritesSnapshot};
use crate::traits::FavoritesStore;

/// Favorites kept in memory, optionally seeded from a JSON file.
#[derive(Debug, Default)]
pub struct MemoryFavoritesStore {
    state: Arc<RwLock<FavoritesSnapshot>>,
    closed: Arc<AtomicBool>,
}

impl MemoryFavoritesStore {
    pub fn new(snapshot: FavoritesSnapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(snapshot)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: FavoritesSnapshot = serde_json::from_str(json).context("Invalid favorites JSON")?;
        info!("Loaded {} favorites", snapshot.favorites.len());
        Ok(Self::new(snapshot))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read favorites file {}", path.display()))?;
        Self::from_json(&json)
    }

    pub async fn to_json(&self) -> Result<String> {
        let state = self.state.read().await;
        Ok(serde_json::to_string_pretty(&*state)?)
    }

    /// Fail every further call as if the host runtime had gone away.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(TEARDOWN_SIGNATURE.to_string()))
        } else {
            Ok(())
        }
    }
}

impl Clone for MemoryFavoritesStore {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            closed: Arc::clone(&self.closed),
        }
    }
}

#[async_trait]
impl FavoritesStore for MemoryFavoritesStore {
    async fn snapshot(&self) -> Result<FavoritesSnapshot, StoreError> {
        self.check_open()?;
        Ok(self.state.read().await.clone())
    }

    async fn set_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.check_open()?;
        self.state.write().await.enabled = enabled;
        Ok(())
    }

    async fn set_filter_active(&self, active: bool) -> Result<(), StoreError> {
        self.check_open()?;
        self.state.write().await.filter_active = active;
        Ok(())
    }

    async fn toggle(&self, entry: FavoriteEntry) -> Result<bool, StoreError> {
        self.check_open()?;
        let mut state = self.state.write().await;
        if state.favorites.remove(&entry.merchant_key).is_some() {
            return Ok(false);
        }
        state.favorites.insert(entry.merchant_key.clone(), entry);
        Ok(true)
    }
}
