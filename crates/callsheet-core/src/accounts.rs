use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A social account whose posts are polled for predictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAccount {
    /// Lowercased handle without the leading `@`; unique key.
    pub handle: String,
    pub x_user_id: String,
    pub display_name: Option<String>,
    pub verified: bool,
    pub avatar_url: Option<String>,
    pub account_created_at: Option<DateTime<Utc>>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Canonical form of an account handle: trimmed, `@` stripped, lowercased.
#[must_use]
pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handle_lowercases_and_strips_at() {
        assert_eq!(normalize_handle("  @Alice "), "alice");
        assert_eq!(normalize_handle("CryptoBob"), "cryptobob");
    }
}
