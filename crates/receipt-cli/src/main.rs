//! Receipt CLI
//!
//! Decodes fiscal receipt QR payloads and looks receipts up in the
//! configured sources.
//!
//! # Usage
//!
//! ```bash
//! # Show the parameters encoded in a scanned QR code
//! receipt-cli decode 't=20170615T141100&s=67.20&fn=8710000100036875&i=78337&fp=255743793&n=1'
//!
//! # Look the receipt up in every configured source, in order
//! receipt-cli retrieve 't=20170615T141100&s=67.20&fn=8710000100036875&i=78337&fp=255743793&n=1'
//!
//! # Ask one source only
//! receipt-cli retrieve --source taxcom 't=...'
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use receipt_core::{qr, AppConfig, SourceKind};
use receipt_retrievers::{available_sources, build_retriever, CombinedRetriever, ReceiptRetriever};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "receipt-cli")]
#[command(version)]
#[command(about = "Decode fiscal receipt QR codes and retrieve itemized receipts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a QR payload and print its receipt parameters as JSON
    Decode {
        /// Raw text scanned from the receipt QR code
        code: String,
    },

    /// Retrieve the itemized receipt and print it as JSON
    Retrieve {
        /// Source to query: a source id or `combined` for the configured chain
        #[arg(long, default_value = "combined")]
        source: SourceSelection,

        /// Raw text scanned from the receipt QR code
        code: String,
    },
}

/// Which source the `retrieve` command asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceSelection {
    Combined,
    Single(SourceKind),
}

impl FromStr for SourceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == receipt_retrievers::combined::SOURCE_ID {
            return Ok(Self::Combined);
        }
        s.parse().map(Self::Single).map_err(|_| {
            let known: Vec<&str> = available_sources().iter().map(|k| k.as_str()).collect();
            format!("unknown source '{s}', expected combined or one of: {}", known.join(", "))
        })
    }
}

impl fmt::Display for SourceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Combined => f.write_str(receipt_retrievers::combined::SOURCE_ID),
            Self::Single(kind) => write!(f, "{kind}"),
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,receipt=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("cannot load config from {}", path.display()))?;
            config.apply_env(|name| std::env::var(name).ok())?;
            config
        }
        None => AppConfig::load_with_env().context("cannot load config")?,
    };
    Ok(config)
}

fn build_selected(selection: SourceSelection, config: &AppConfig) -> Result<Arc<dyn ReceiptRetriever>> {
    let retriever: Arc<dyn ReceiptRetriever> = match selection {
        SourceSelection::Combined => Arc::new(CombinedRetriever::from_config(config)?),
        SourceSelection::Single(kind) => build_retriever(kind, config)?,
    };
    Ok(retriever)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { code } => {
            let Some(params) = qr::decode(&code) else {
                bail!("cannot parse code");
            };
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
        Commands::Retrieve { source, code } => {
            let Some(params) = qr::decode(&code) else {
                bail!("cannot parse code");
            };
            let config = load_config(cli.config.as_ref())?;
            let retriever = build_selected(source, &config)?;

            info!("Retrieving receipt {} via {}", params, source);
            let Some(receipt) = retriever.get_receipt(&params).await.into_receipt() else {
                bail!("no receipt found");
            };

            info!("Receipt successfully retrieved: {} items", receipt.items.len());
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_source_selection_parsing() {
        assert_eq!("combined".parse::<SourceSelection>(), Ok(SourceSelection::Combined));
        assert_eq!(
            "platforma-ofd".parse::<SourceSelection>(),
            Ok(SourceSelection::Single(SourceKind::PlatformaOfd))
        );

        let err = "nalog".parse::<SourceSelection>().expect_err("unknown source");
        assert!(err.contains("official-registry, platforma-ofd, taxcom"));
    }

    #[test]
    fn test_retrieve_defaults_to_combined() {
        let cli = Cli::try_parse_from(["receipt-cli", "retrieve", "t=1"]).expect("valid arguments");
        match cli.command {
            Commands::Retrieve { source, code } => {
                assert_eq!(source, SourceSelection::Combined);
                assert_eq!(code, "t=1");
            }
            Commands::Decode { .. } => panic!("expected retrieve"),
        }
    }
}
