//! Spot-price lookup over an ordered chain of public quote providers.
//!
//! [`QuoteSource`] asks each [`QuoteProvider`] in turn and returns the first
//! numeric price. Provider failures are logged and skipped; a symbol nobody
//! can price resolves to `None`.

pub mod binance;
pub mod bybit;
pub mod error;
mod http;
mod pairs;
pub mod yahoo;

use std::time::Duration;

use async_trait::async_trait;
use callsheet_core::normalize_symbol;

pub use binance::BinanceProvider;
pub use bybit::BybitProvider;
pub use error::QuoteError;
pub use yahoo::YahooProvider;

/// One upstream price provider.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Price of `symbol` in USD-equivalent terms, `Ok(None)` if the provider
    /// does not list it.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError`] on transport or decoding failure.
    async fn fetch_price(&self, symbol: &str) -> Result<Option<f64>, QuoteError>;
}

/// Infallible price lookup used by the extractor's quote tool.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn fetch_price(&self, symbol: &str) -> Option<f64>;
}

/// Priority-ordered provider chain with a per-provider deadline.
pub struct QuoteSource {
    providers: Vec<Box<dyn QuoteProvider>>,
    provider_timeout: Duration,
}

impl QuoteSource {
    #[must_use]
    pub fn new(providers: Vec<Box<dyn QuoteProvider>>, provider_timeout: Duration) -> Self {
        Self {
            providers,
            provider_timeout,
        }
    }

    /// Binance, then Bybit, then Yahoo Finance, each with its own client timeout.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::Http`] if an HTTP client cannot be constructed.
    pub fn with_default_providers(timeout_secs: u64) -> Result<Self, QuoteError> {
        let providers: Vec<Box<dyn QuoteProvider>> = vec![
            Box::new(BinanceProvider::new(timeout_secs)?),
            Box::new(BybitProvider::new(timeout_secs)?),
            Box::new(YahooProvider::new(timeout_secs)?),
        ];
        // Crypto providers may walk several pairs before giving up.
        Ok(Self::new(
            providers,
            Duration::from_secs(timeout_secs.saturating_mul(4)),
        ))
    }

    #[must_use]
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl PriceLookup for QuoteSource {
    async fn fetch_price(&self, symbol: &str) -> Option<f64> {
        let Some(symbol) = normalize_symbol(symbol) else {
            tracing::debug!(symbol, "quotes: empty or malformed symbol");
            return None;
        };

        for provider in &self.providers {
            let name = provider.name();
            match tokio::time::timeout(self.provider_timeout, provider.fetch_price(&symbol)).await
            {
                Ok(Ok(Some(price))) if price.is_finite() && price > 0.0 => {
                    tracing::debug!(symbol = %symbol, provider = name, price, "quotes: resolved");
                    return Some(price);
                }
                Ok(Ok(_)) => {
                    tracing::debug!(symbol = %symbol, provider = name, "quotes: not listed");
                }
                Ok(Err(e)) => {
                    tracing::warn!(symbol = %symbol, provider = name, error = %e, "quotes: provider failed");
                }
                Err(_) => {
                    tracing::warn!(
                        symbol = %symbol,
                        provider = name,
                        timeout_secs = self.provider_timeout.as_secs(),
                        "quotes: provider timed out"
                    );
                }
            }
        }

        tracing::info!(symbol = %symbol, "quotes: no provider could price symbol");
        None
    }
}
