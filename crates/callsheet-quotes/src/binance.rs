//! Binance spot ticker (`/api/v3/ticker/price`).

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::error::QuoteError;
use crate::http::{build_client, get_json, join, parse_base_url, price_field};
use crate::pairs::{self, PairMarket};
use crate::QuoteProvider;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "FDUSD"];

pub struct BinanceProvider {
    client: Client,
    base_url: Url,
}

impl BinanceProvider {
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
impl PairMarket for BinanceProvider {
    async fn pair_price(&self, pair: &str) -> Result<Option<f64>, QuoteError> {
        let url = join(&self.base_url, "api/v3/ticker/price")?;
        let body = get_json(&self.client, url, &[("symbol", pair)]).await?;
        Ok(body.as_ref().and_then(|b| b.get("price")).and_then(price_field))
    }
}

#[async_trait]
impl QuoteProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Option<f64>, QuoteError> {
        pairs::resolve(self, symbol, QUOTE_CURRENCIES).await
    }
}
