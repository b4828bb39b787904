//! Background lookup jobs.
//!
//! A lookup that finds nothing is not an error: the receipt may simply not
//! have reached any source yet. The job reports when it should run again and
//! leaves queueing to the caller.

use crate::retriever::{ReceiptRetriever, Retrieval};
use chrono::{DateTime, Utc};
use receipt_core::{ParsedReceipt, ReceiptParams, RetrievalConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Queue payload for one receipt lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupJob {
    /// Random job identifier
    pub id: String,
    /// What to look up
    pub params: ReceiptParams,
    /// 1-based attempt counter
    pub attempt: u32,
}

/// Result of running a [`LookupJob`] once.
#[derive(Debug)]
pub enum LookupOutcome {
    /// A source found the receipt
    Retrieved(ParsedReceipt),
    /// Nothing found; run the job again after `retry_after`.
    Reschedule {
        /// Delay before the next attempt
        retry_after: Duration,
        /// RFC 3339 timestamp of the next attempt
        next_run_at: String,
    },
}

impl LookupJob {
    /// A first attempt at looking up `params`.
    #[must_use]
    pub fn new(params: ReceiptParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            params,
            attempt: 1,
        }
    }

    /// The same job, counted as its next attempt.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }

    /// Run one full lookup against `retriever`.
    pub async fn run(&self, retriever: &dyn ReceiptRetriever, config: &RetrievalConfig) -> LookupOutcome {
        tracing::info!(
            "Looking up receipt {} (job {}, attempt {})",
            self.params,
            self.id,
            self.attempt
        );

        match retriever.get_receipt(&self.params).await {
            Retrieval::Found(receipt) => {
                tracing::info!("Receipt retrieved for job {}", self.id);
                return LookupOutcome::Retrieved(receipt);
            }
            Retrieval::NotFound => {}
            Retrieval::Failed(e) => {
                tracing::warn!("Cannot retrieve receipt: {}", e);
            }
        }

        let retry_after = Duration::from_secs(config.reschedule_after_secs);
        let next_run_at = next_run_timestamp(Utc::now(), retry_after);
        tracing::info!(
            "Receipt not retrieved, rescheduling job {} at {}",
            self.id,
            next_run_at
        );

        LookupOutcome::Reschedule {
            retry_after,
            next_run_at,
        }
    }
}

/// RFC 3339 timestamp of `now + retry_after`.
#[must_use]
pub fn next_run_timestamp(now: DateTime<Utc>, retry_after: Duration) -> String {
    let delta = chrono::Duration::from_std(retry_after).unwrap_or(chrono::Duration::MAX);
    now.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .to_rfc3339()
}
