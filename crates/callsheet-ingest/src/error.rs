use callsheet_analyst::AnalystError;
use callsheet_db::DbError;
use callsheet_quotes::QuoteError;
use callsheet_social::SocialError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] DbError),

    #[error("analysis failed: {0}")]
    Analyst(#[from] AnalystError),

    #[error("social lookup failed: {0}")]
    Social(#[from] SocialError),

    #[error("quote client setup failed: {0}")]
    Quote(#[from] QuoteError),
}
