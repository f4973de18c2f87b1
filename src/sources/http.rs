use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::sources::fetch::{FetchFailure, Fetched, Fetcher};

/// [`Fetcher`] over plain HTTP GET. Non-2xx responses are failures.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched, FetchFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::new(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("GET {} returned {}", url, status);
            return Err(FetchFailure::new(status.to_string()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchFailure::new(e.to_string()))?;

        Ok(Fetched {
            content_type,
            body: body.to_vec(),
        })
    }
}
