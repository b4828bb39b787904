//! The receipt source capability and the pieces every source shares.

use crate::error::{Result, RetrieveError};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use receipt_core::{ParsedReceipt, ReceiptParams, RetrievalConfig};
use reqwest::{Client, Response};
use std::time::Duration;

/// Longest response body excerpt kept in error messages.
const BODY_EXCERPT_CHARS: usize = 200;

/// Outcome of asking one source for a receipt.
#[derive(Debug)]
pub enum Retrieval {
    /// The source returned a fully populated receipt
    Found(ParsedReceipt),
    /// The source answered, and the receipt is not there
    NotFound,
    /// The source could not be queried or answered unexpectedly
    Failed(RetrieveError),
}

impl Retrieval {
    /// The receipt, if one was found.
    #[must_use]
    pub fn into_receipt(self) -> Option<ParsedReceipt> {
        match self {
            Self::Found(receipt) => Some(receipt),
            Self::NotFound | Self::Failed(_) => None,
        }
    }

    /// Whether a receipt was found.
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl From<Result<Option<ParsedReceipt>>> for Retrieval {
    fn from(result: Result<Option<ParsedReceipt>>) -> Self {
        match result {
            Ok(Some(receipt)) => Self::Found(receipt),
            Ok(None) => Self::NotFound,
            Err(e) => Self::Failed(e),
        }
    }
}

/// A source of fiscal receipts.
///
/// Implementations hold only read-only configuration; every call is
/// independent of previous ones.
#[async_trait]
pub trait ReceiptRetriever: Send + Sync {
    /// Look the receipt up in this source.
    async fn get_receipt(&self, params: &ReceiptParams) -> Retrieval;

    /// Stable identifier of this source, e.g. `taxcom`.
    fn source_id(&self) -> &str;
}

/// Suspends the current task between polling attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Build the HTTP client shared by a source's requests.
pub(crate) fn http_client(config: &RetrievalConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| RetrieveError::Client(e.to_string()))
}

/// Turn a response with an unexpected status into an error, keeping a short
/// excerpt of its body for the logs.
pub(crate) async fn unexpected_status(source_id: &str, response: Response) -> RetrieveError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unreadable body".to_string());

    RetrieveError::UnexpectedStatus {
        source_id: source_id.to_string(),
        status,
        body: body.trim().chars().take(BODY_EXCERPT_CHARS).collect(),
    }
}

/// Resolve a configured base URL, falling back to the source default.
pub(crate) fn base_url(configured: &str, default: &str) -> String {
    let url = if configured.trim().is_empty() {
        default
    } else {
        configured.trim()
    };
    url.trim_end_matches('/').to_string()
}

/// Shift a source's local wall-clock time back by its fixed UTC offset.
///
/// Offsets come from configuration, so one that cannot be applied is a
/// parse failure of the source rather than a panic.
pub(crate) fn shift_by_offset(
    source_id: &str,
    local: NaiveDateTime,
    offset_hours: i64,
) -> Result<NaiveDateTime> {
    TimeDelta::try_hours(offset_hours)
        .and_then(|offset| local.checked_sub_signed(offset))
        .ok_or_else(|| {
            RetrieveError::parse(
                source_id,
                format!("cannot apply timezone offset of {offset_hours} hours to {local}"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_from_result() {
        assert!(matches!(Retrieval::from(Ok(None)), Retrieval::NotFound));
        assert!(matches!(
            Retrieval::from(Err(RetrieveError::PollingExhausted { tries: 1 })),
            Retrieval::Failed(RetrieveError::PollingExhausted { tries: 1 })
        ));
        assert!(Retrieval::NotFound.into_receipt().is_none());
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("", "https://a.example/"), "https://a.example");
        assert_eq!(base_url(" http://127.0.0.1:8080/ ", "https://a.example"), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_shift_by_offset() {
        let local = chrono::NaiveDate::from_ymd_opt(2017, 8, 6)
            .and_then(|d| d.and_hms_opt(20, 8, 0))
            .expect("valid timestamp");

        let shifted = shift_by_offset("test", local, 7).expect("in range");
        assert_eq!(shifted.to_string(), "2017-08-06 13:08:00");
        assert_eq!(shift_by_offset("test", local, -3).expect("in range").to_string(), "2017-08-06 23:08:00");

        for offset in [i64::MAX, i64::MIN, 1_000_000_000] {
            assert!(matches!(
                shift_by_offset("test", local, offset),
                Err(RetrieveError::Parse { .. })
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits() {
        let started = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(5)).await;
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
