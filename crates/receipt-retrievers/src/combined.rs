//! Ordered fallback over several receipt sources.

use crate::error::Result;
use crate::retriever::{ReceiptRetriever, Retrieval};
use crate::sources::build_retriever;
use async_trait::async_trait;
use receipt_core::{AppConfig, ParsedReceipt, ReceiptParams};
use std::sync::Arc;

pub const SOURCE_ID: &str = "combined";

/// Tries each source in order and returns the first receipt found.
///
/// A source that fails is logged and skipped; the chain itself never fails.
/// Sources are queried one at a time, so a source later in the list is never
/// contacted once an earlier one has found the receipt.
#[derive(Default)]
pub struct CombinedRetriever {
    retrievers: Vec<Arc<dyn ReceiptRetriever>>,
}

impl CombinedRetriever {
    #[must_use]
    pub fn new(retrievers: Vec<Arc<dyn ReceiptRetriever>>) -> Self {
        Self { retrievers }
    }

    /// Build the chain from the configured source order.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let retrievers = config
            .retrieval
            .sources
            .iter()
            .map(|&kind| build_retriever(kind, config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(retrievers))
    }

    /// Append a source to the end of the chain.
    pub fn add_retriever(&mut self, retriever: Arc<dyn ReceiptRetriever>) {
        self.retrievers.push(retriever);
    }

    /// Identifiers of the chained sources, in query order.
    #[must_use]
    pub fn source_ids(&self) -> Vec<&str> {
        self.retrievers.iter().map(|r| r.source_id()).collect()
    }

    /// The first receipt any source finds, or `None` when every source
    /// reported not-found or failed.
    pub async fn find_receipt(&self, params: &ReceiptParams) -> Option<ParsedReceipt> {
        for retriever in &self.retrievers {
            tracing::debug!("Retrieving receipt via {}", retriever.source_id());

            match retriever.get_receipt(params).await {
                Retrieval::Found(receipt) => {
                    tracing::info!("Receipt found via {}", retriever.source_id());
                    return Some(receipt);
                }
                Retrieval::NotFound => {
                    tracing::debug!("Receipt not found via {}", retriever.source_id());
                }
                Retrieval::Failed(e) => {
                    tracing::warn!("Cannot retrieve receipt via {}: {}", retriever.source_id(), e);
                }
            }
        }
        None
    }
}

#[async_trait]
impl ReceiptRetriever for CombinedRetriever {
    async fn get_receipt(&self, params: &ReceiptParams) -> Retrieval {
        match self.find_receipt(params).await {
            Some(receipt) => Retrieval::Found(receipt),
            None => Retrieval::NotFound,
        }
    }

    fn source_id(&self) -> &str {
        SOURCE_ID
    }
}
