//! Shared configuration and domain records for callsheet.

pub mod accounts;
pub mod agents;
pub mod app_config;
pub mod config;
pub mod extraction;
pub mod posts;
pub mod timestamps;

use thiserror::Error;

pub use accounts::{normalize_handle, TrackedAccount};
pub use agents::{AccountRef, CombinedPrediction};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use extraction::{normalize_symbol, AssetCategory, Direction, ExtractionResult};
pub use posts::FetchedPost;
pub use timestamps::{parse_created_at, parse_timestamp};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
