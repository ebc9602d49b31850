use std::path::Path;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;

/// Loads captured pages and "load more" batches from disk or over HTTP
pub struct PageSource {
    client: Client,
}

impl PageSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    pub fn is_remote(location: &str) -> bool {
        let lower = location.trim().to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// HTML at `location`, a file path or an `http(s)` URL.
    pub async fn load(&self, location: &str) -> Result<String> {
        if Self::is_remote(location) {
            self.fetch(location).await
        } else {
            Self::read(Path::new(location)).await
        }
    }

    /// Every batch, in order.
    pub async fn load_all(&self, locations: &[String]) -> Result<Vec<String>> {
        let mut pages = Vec::with_capacity(locations.len());
        for location in locations {
            pages.push(self.load(location).await?);
        }
        Ok(pages)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        info!("Fetching {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch {}: {}", url, response.status()));
        }

        Ok(response.text().await?)
    }

    async fn read(path: &Path) -> Result<String> {
        info!("Reading {}", path.display());
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}
