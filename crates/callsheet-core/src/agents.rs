use serde::{Deserialize, Serialize};

use crate::extraction::Direction;

pub const MAX_INFLUENCE: f64 = 100.0;

/// An account reference inside an agent, weighted by influence (0–100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRef {
    pub username: String,
    pub influence: f64,
}

impl AccountRef {
    /// Returns an error message when the influence weight is out of range.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message suitable for a validation response.
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("account username must not be empty".to_string());
        }
        if !(0.0..=MAX_INFLUENCE).contains(&self.influence) {
            return Err(format!(
                "influence for {} must be between 0 and 100, got {}",
                self.username, self.influence
            ));
        }
        Ok(())
    }
}

/// One merged forecast for an agent, as produced by the aggregation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedPrediction {
    pub agent_id: i64,
    pub token: String,
    #[serde(default)]
    pub predicted_price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub direction: Option<Direction>,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub supporting_influencers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn influence_bounds_are_inclusive() {
        for influence in [0.0, 55.5, 100.0] {
            let r = AccountRef {
                username: "alice".into(),
                influence,
            };
            assert!(r.validate().is_ok());
        }
    }

    #[test]
    fn influence_out_of_range_is_rejected() {
        let r = AccountRef {
            username: "alice".into(),
            influence: 101.0,
        };
        let err = r.validate().expect_err("should reject");
        assert!(err.contains("between 0 and 100"));
    }

    #[test]
    fn empty_username_is_rejected() {
        let r = AccountRef {
            username: "  ".into(),
            influence: 10.0,
        };
        assert!(r.validate().is_err());
    }
}
