use std::io::prelude::*;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::CONTENT_TYPE;

use crate::config::CrawlerConfig;
use crate::strategy::{Fetcher, Page};

/// Fetches pages over HTTP, following redirects.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> anyhow::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .deflate(true)
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> anyhow::Result<Page> {
        let resp = self.client.get(locator).send().await?;
        let locator = resp.url().to_string();

        if !resp.status().is_success() {
            log::debug!("Got {} for {locator}", resp.status());
        }

        let body = match resp.headers().get(CONTENT_TYPE) {
            Some(c) if c == "application/x-gzip" || c == "application/gzip" => {
                let compressed = resp.bytes().await?;
                let mut gz = GzDecoder::new(&compressed[..]);
                let mut body = String::new();
                gz.read_to_string(&mut body)?;
                body
            }
            _ => resp.text().await?,
        };

        Ok(Page { locator, body })
    }
}
