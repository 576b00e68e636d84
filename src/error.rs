use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to request {url} (status {status})")]
    Fetch { url: String, status: u16 },

    #[error("Failed to decode builds from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed Link header {header:?}: {reason}")]
    ContinuationParse { header: String, reason: String },

    #[error("Failed to submit {count} metrics to namespace {namespace}: {message}")]
    Submission {
        namespace: String,
        count: usize,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MetricsError {
    /// Whether the error came from retrieving builds upstream.
    pub fn is_retrieval(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Decode { .. } | Self::Network(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
