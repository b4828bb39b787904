//! Receipt Core - Foundation crate for receipt retrieval.
//!
//! This crate provides the value objects exchanged between the QR decoder,
//! the receipt sources and the surrounding persistence layer, together with
//! shared error types and configuration management.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - `ReceiptParams`, `ParsedReceipt` and decimal normalization
//! - [`qr`] - Decoding of scanned fiscal QR payloads
//!
//! # Example
//!
//! ```rust
//! use receipt_core::qr;
//!
//! let params = qr::decode("t=20170615T141100&s=67.20&fn=8710000100036875&i=78337&fp=255743793")
//!     .expect("well-formed payload");
//! assert_eq!(params.fiscal_document_number(), "78337");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod qr;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, OperatorConfig, RegistryConfig, RetrievalConfig, SourceKind};
pub use error::{ConfigError, ConfigResult, CoreError, DecodeError, Result};
pub use types::{ParsedReceipt, ParsedReceiptItem, ReceiptParams};
