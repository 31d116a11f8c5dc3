//! Bybit v5 spot tickers (`/v5/market/tickers?category=spot`).

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::error::QuoteError;
use crate::http::{build_client, get_json, join, parse_base_url, price_field};
use crate::pairs::{self, PairMarket};
use crate::QuoteProvider;

const DEFAULT_BASE_URL: &str = "https://api.bybit.com";
const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC"];

pub struct BybitProvider {
    client: Client,
    base_url: Url,
}

impl BybitProvider {
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
impl PairMarket for BybitProvider {
    async fn pair_price(&self, pair: &str) -> Result<Option<f64>, QuoteError> {
        let url = join(&self.base_url, "v5/market/tickers")?;
        let Some(body) =
            get_json(&self.client, url, &[("category", "spot"), ("symbol", pair)]).await?
        else {
            return Ok(None);
        };

        // Unknown symbols come back as 200 with a non-zero retCode.
        if body.get("retCode").and_then(serde_json::Value::as_i64) != Some(0) {
            return Ok(None);
        }

        Ok(body
            .pointer("/result/list/0/lastPrice")
            .and_then(price_field))
    }
}

#[async_trait]
impl QuoteProvider for BybitProvider {
    fn name(&self) -> &'static str {
        "bybit"
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Option<f64>, QuoteError> {
        pairs::resolve(self, symbol, QUOTE_CURRENCIES).await
    }
}
