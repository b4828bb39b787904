use thiserror::Error;

/// Reasons a single source could not answer.
///
/// A source that answered "no such receipt" does not produce an error; see
/// [`crate::Retrieval::NotFound`].
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response from {source_id}: HTTP {status} ({body})")]
    UnexpectedStatus {
        source_id: String,
        status: u16,
        body: String,
    },

    #[error("no result after {tries} tries")]
    PollingExhausted { tries: u32 },

    #[error("cannot parse response from {source_id}: {reason}")]
    Parse { source_id: String, reason: String },

    #[error("cannot create HTTP client: {0}")]
    Client(String),
}

impl RetrieveError {
    pub(crate) fn parse(source_id: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrieveError>;
