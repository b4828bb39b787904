//! Construction of sources by kind.

use crate::error::Result;
use crate::official::OfficialRegistryRetriever;
use crate::platforma_ofd::PlatformaOfdRetriever;
use crate::retriever::ReceiptRetriever;
use crate::taxcom::TaxcomRetriever;
use receipt_core::{AppConfig, SourceKind};
use std::sync::Arc;

/// Every source this crate can query, in the default order.
#[must_use]
pub fn available_sources() -> &'static [SourceKind] {
    &SourceKind::ALL
}

/// Build the source of the given kind from its configuration section.
pub fn build_retriever(kind: SourceKind, config: &AppConfig) -> Result<Arc<dyn ReceiptRetriever>> {
    tracing::debug!("Building {} retriever", kind);

    let retriever: Arc<dyn ReceiptRetriever> = match kind {
        SourceKind::OfficialRegistry => Arc::new(OfficialRegistryRetriever::new(
            &config.registry,
            &config.retrieval,
        )?),
        SourceKind::PlatformaOfd => Arc::new(PlatformaOfdRetriever::new(
            &config.platforma_ofd,
            &config.retrieval,
        )?),
        SourceKind::Taxcom => Arc::new(TaxcomRetriever::new(&config.taxcom, &config.retrieval)?),
    };
    Ok(retriever)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_retrievers_report_their_kind() {
        let config = AppConfig::default();
        for &kind in available_sources() {
            let retriever = build_retriever(kind, &config).expect("build retriever");
            assert_eq!(retriever.source_id(), kind.as_str());
        }
    }

    #[test]
    fn test_available_sources() {
        assert_eq!(
            available_sources(),
            &[SourceKind::OfficialRegistry, SourceKind::PlatformaOfd, SourceKind::Taxcom]
        );
    }
}
