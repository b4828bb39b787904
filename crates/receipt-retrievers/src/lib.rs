//! Receipt Retrievers - Looking fiscal receipts up in external sources.
//!
//! This crate turns [`ReceiptParams`](receipt_core::ReceiptParams) decoded from
//! a QR code into a fully itemized [`ParsedReceipt`](receipt_core::ParsedReceipt)
//! by asking, in order, the official fiscal registry API and the public receipt
//! pages of fiscal data operators.
//!
//! # Sources
//!
//! - [`OfficialRegistryRetriever`] - JSON API with an existence check and
//!   polling of the detail endpoint
//! - [`PlatformaOfdRetriever`] - Platforma OFD receipt page
//! - [`TaxcomRetriever`] - Taxcom receipt page, in either of its two layouts
//! - [`CombinedRetriever`] - ordered fallback over any of the above
//!
//! Every source answers with a [`Retrieval`]: found, not found, or failed.
//! The combined chain absorbs failures, so callers only see found or not found.
//!
//! # Example
//!
//! ```rust,ignore
//! use receipt_core::{qr, AppConfig};
//! use receipt_retrievers::CombinedRetriever;
//!
//! let config = AppConfig::load_with_env()?;
//! let params = qr::decode(code).ok_or("cannot parse code")?;
//!
//! let retriever = CombinedRetriever::from_config(&config)?;
//! if let Some(receipt) = retriever.find_receipt(&params).await {
//!     println!("{} items from {}", receipt.items.len(), receipt.seller_name);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod combined;
#[allow(missing_docs)]
pub mod error;
pub mod jobs;
mod markup;
#[allow(missing_docs)]
pub mod official;
#[allow(missing_docs)]
pub mod platforma_ofd;
pub mod retriever;
pub mod sources;
#[allow(missing_docs)]
pub mod taxcom;

// Re-export commonly used types
pub use combined::CombinedRetriever;
pub use error::{Result, RetrieveError};
pub use jobs::{LookupJob, LookupOutcome};
pub use official::OfficialRegistryRetriever;
pub use platforma_ofd::{PlatformaOfdParser, PlatformaOfdRetriever};
pub use retriever::{ReceiptRetriever, Retrieval, Sleeper, TokioSleeper};
pub use sources::{available_sources, build_retriever};
pub use taxcom::{Layout as TaxcomLayout, TaxcomParser, TaxcomRetriever};
