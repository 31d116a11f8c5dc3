use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::QuoteError;

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client, QuoteError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
        .user_agent("Mozilla/5.0 (compatible; callsheet/0.1)")
        .build()?)
}

pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, QuoteError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| QuoteError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn join(base: &Url, path: &str) -> Result<Url, QuoteError> {
    base.join(path).map_err(|e| QuoteError::InvalidBaseUrl {
        url: format!("{base}{path}"),
        reason: e.to_string(),
    })
}

/// GET a JSON document, mapping any 4xx status to `Ok(None)`.
///
/// Exchanges answer unknown symbols with 400 or 404; those mean "not
/// listed" rather than a failure.
pub(crate) async fn get_json(
    client: &Client,
    url: Url,
    query: &[(&str, &str)],
) -> Result<Option<serde_json::Value>, QuoteError> {
    let context = url.to_string();
    let response = client.get(url).query(query).send().await?;
    if response.status().is_client_error() {
        return Ok(None);
    }
    let body = response.error_for_status()?.text().await?;
    serde_json::from_str(&body)
        .map(Some)
        .map_err(|e| QuoteError::Deserialize { context, source: e })
}

/// Parse a price that exchanges send either as a JSON string or a number.
pub(crate) fn price_field(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .filter(|p: &f64| p.is_finite() && *p > 0.0)
}
