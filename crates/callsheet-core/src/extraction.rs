use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

const DEFAULT_PREDICTION_REASON: &str = "model gave no rationale for the prediction";
const DEFAULT_EXCLUSION_REASON: &str = "model gave no rationale for the exclusion";

/// Asset class of the instrument a post talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Crypto,
    Stock,
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crypto" | "cryptocurrency" | "token" | "coin" => Ok(Self::Crypto),
            "stock" | "equity" | "share" => Ok(Self::Stock),
            other => Err(format!("unknown asset category: {other}")),
        }
    }
}

/// Directional call of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "bullish" | "long" | "higher" => Ok(Self::Up),
            "down" | "bearish" | "short" | "lower" => Ok(Self::Down),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Structured output of the prediction extractor for a single post.
///
/// Every optional field means "not stated in the post" when absent. The
/// `raw_response` and `parse_error` fields are only populated on degraded
/// results where the model's answer could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_prediction: bool,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub category: Option<AssetCategory>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub predicted_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub percent_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub direction: Option<Direction>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timeframe: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub image_analysis: Option<String>,
    #[serde(default, deserialize_with = "lenient_reason")]
    pub reason: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ExtractionResult {
    /// A plain "not a prediction" result with the given rationale.
    #[must_use]
    pub fn not_a_prediction(reason: impl Into<String>) -> Self {
        Self {
            is_prediction: false,
            category: None,
            token: None,
            name: None,
            predicted_price: None,
            percent_change: None,
            currency: None,
            direction: None,
            timeframe: None,
            current_price: None,
            image_analysis: None,
            reason: reason.into(),
            evidence: None,
            raw_response: None,
            parse_error: None,
        }
    }

    /// Degraded result for a model answer that was empty or not decodable.
    ///
    /// The raw text is kept for diagnostics.
    #[must_use]
    pub fn parse_failure(raw: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        let reason = if raw.trim().is_empty() {
            "empty model response".to_string()
        } else {
            format!("model response could not be parsed: {error}")
        };
        Self {
            raw_response: Some(raw.to_string()),
            parse_error: Some(error),
            ..Self::not_a_prediction(reason)
        }
    }

    /// Whether this result came from an undecodable model answer.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.parse_error.is_some()
    }

    /// Enforce the record's invariants after decoding a model answer.
    ///
    /// Non-predictions carry no numbers, the ticker is normalised, and the
    /// rationale is never empty.
    #[must_use]
    pub fn sanitize(mut self) -> Self {
        self.token = self.token.as_deref().and_then(normalize_symbol);
        self.currency = self.currency.map(|c| c.trim().to_ascii_uppercase());

        if !self.is_prediction {
            self.predicted_price = None;
            self.percent_change = None;
            self.current_price = None;
        }

        if self.reason.trim().is_empty() {
            self.reason = if self.is_prediction {
                DEFAULT_PREDICTION_REASON.to_string()
            } else {
                DEFAULT_EXCLUSION_REASON.to_string()
            };
        }
        self
    }
}

/// Strip a cashtag or hashtag marker and upper-case a ticker symbol.
///
/// Returns `None` for an empty symbol or one containing whitespace.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches(['$', '#']).trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        ),
        Some(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    })
}

fn lenient_enum<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_reason<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

/// Accepts a JSON number or a plain numeric string such as `"120,000"`.
///
/// Anything else, including shorthand like `"120k"`, is treated as absent.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        Some(serde_json::Value::String(s)) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    })
}
