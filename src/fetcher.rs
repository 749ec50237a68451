use async_trait::async_trait;
use reqwest::Client;

use crate::config::FetcherConfig;
use crate::utils::error::{AppError, Result};

/// Retrieves the raw body of a page. No parsing happens here.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let fetch_error = |message: String| AppError::Fetch {
            url: url.to_string(),
            message,
        };

        let parsed = url::Url::parse(url).map_err(|e| fetch_error(format!("invalid url: {}", e)))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("unexpected status {}", status)));
        }

        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }
}
