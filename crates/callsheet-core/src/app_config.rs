use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub allowed_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub llm_timeout_secs: u64,
    pub x_bearer_token: String,
    pub x_api_base_url: String,
    pub social_timeout_secs: u64,
    pub quote_timeout_secs: u64,
    pub ingest_interval_secs: u64,
    pub ingest_batch_size: usize,
    pub ingest_batch_cooldown_secs: u64,
    pub ingest_max_posts: u32,
    pub rate_limit_fallback_secs: u64,
    pub aggregate_interval_secs: u64,
    pub aggregate_window_hours: u32,
    pub combined_retention_days: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("allowed_origins", &self.allowed_origins)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("openai_api_key", &"[redacted]")
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("x_bearer_token", &"[redacted]")
            .field("x_api_base_url", &self.x_api_base_url)
            .field("social_timeout_secs", &self.social_timeout_secs)
            .field("quote_timeout_secs", &self.quote_timeout_secs)
            .field("ingest_interval_secs", &self.ingest_interval_secs)
            .field("ingest_batch_size", &self.ingest_batch_size)
            .field(
                "ingest_batch_cooldown_secs",
                &self.ingest_batch_cooldown_secs,
            )
            .field("ingest_max_posts", &self.ingest_max_posts)
            .field("rate_limit_fallback_secs", &self.rate_limit_fallback_secs)
            .field("aggregate_interval_secs", &self.aggregate_interval_secs)
            .field("aggregate_window_hours", &self.aggregate_window_hours)
            .field("combined_retention_days", &self.combined_retention_days)
            .finish()
    }
}
