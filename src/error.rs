use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrawlError>;

/// Failures surfaced by the crawler.
///
/// Rate-limit responses never appear here: the client absorbs them into a
/// sleep-and-retry.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Network failure or timeout after the retry budget was spent.
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Non-2xx status after the retry budget was spent.
    #[error("HTTP error {status} ({reason}) for {url}")]
    Http {
        url: String,
        status: u16,
        reason: String,
    },

    /// Body was not JSON or did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    /// Status code for `Http` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            CrawlError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(err: serde_json::Error) -> Self {
        CrawlError::Parse(err.to_string())
    }
}

impl From<csv::Error> for CrawlError {
    fn from(err: csv::Error) -> Self {
        CrawlError::Output(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for CrawlError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        CrawlError::Output(err.to_string())
    }
}
