//! Yahoo Finance chart endpoint, used for equities.

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::error::QuoteError;
use crate::http::{build_client, get_json, join, parse_base_url, price_field};
use crate::QuoteProvider;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

pub struct YahooProvider {
    client: Client,
    base_url: Url,
}

impl YahooProvider {
    /// # Errors
    ///
    /// Returns [`QuoteError::Http`] if the HTTP client cannot be constructed.
    pub fn new(timeout_secs: u64) -> Result<Self, QuoteError> {
        Self::with_base_url(timeout_secs, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`QuoteError::Http`] if the HTTP client cannot be constructed,
    /// or [`QuoteError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(timeout_secs: u64, base_url: &str) -> Result<Self, QuoteError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: parse_base_url(base_url)?,
        })
    }
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Option<f64>, QuoteError> {
        let url = join(&self.base_url, &format!("v8/finance/chart/{symbol}"))?;
        let body = get_json(&self.client, url, &[("interval", "1d"), ("range", "1d")]).await?;
        Ok(body
            .as_ref()
            .and_then(|b| b.pointer("/chart/result/0/meta/regularMarketPrice"))
            .and_then(price_field))
    }
}
