//! Official fiscal registry API.
//!
//! A lookup is two requests. The existence check must answer `204 No
//! Content`; after that the detail endpoint is polled while it answers
//! `202 Accepted`, waiting a fixed delay between attempts.

use crate::error::{Result, RetrieveError};
use crate::retriever::{
    base_url, http_client, shift_by_offset, unexpected_status, ReceiptRetriever, Retrieval, Sleeper,
    TokioSleeper,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use receipt_core::types::{major_to_minor, minor_to_major};
use receipt_core::{ParsedReceipt, ParsedReceiptItem, ReceiptParams, RegistryConfig, RetrievalConfig};
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Number, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const SOURCE_ID: &str = "official-registry";

/// Timestamp layout of the `date` query parameter and of `dateTime` in responses.
const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct OfficialRegistryRetriever {
    client: Client,
    base_url: String,
    login: String,
    password: Option<String>,
    device_id: String,
    device_os: String,
    max_tries: u32,
    retry_delay: Duration,
    timezone_offset_hours: i64,
    sleeper: Arc<dyn Sleeper>,
}

impl OfficialRegistryRetriever {
    pub fn new(config: &RegistryConfig, retrieval: &RetrievalConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(retrieval)?,
            base_url: base_url(&config.base_url, &RegistryConfig::default().base_url),
            login: config.login.clone(),
            password: config.password.clone(),
            device_id: config.device_id.clone(),
            device_os: config.device_os.clone(),
            max_tries: config.max_tries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            timezone_offset_hours: config.timezone_offset_hours,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the timer used between polling attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn request(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.login, self.password.as_deref())
            .header("Device-Id", &self.device_id)
            .header("Device-OS", &self.device_os)
    }

    async fn check_exists(&self, params: &ReceiptParams) -> Result<()> {
        tracing::debug!("Checking if receipt exists");

        let sum = major_to_minor(params.amount()).ok_or_else(|| {
            RetrieveError::parse(SOURCE_ID, format!("amount {} out of range", params.amount()))
        })?;

        // Drive number comes before document number, and the sum is sent in whole kopecks.
        let url = format!(
            "{}/v1/ofds/*/inns/*/fss/{}/operations/1/tickets/{}",
            self.base_url,
            params.fiscal_drive_number(),
            params.fiscal_document_number()
        );
        let response = self
            .request(&url)
            .query(&[
                ("fiscalSign", params.fiscal_sign().to_string()),
                ("date", params.created().format(API_TIMESTAMP_FORMAT).to_string()),
                ("sum", sum.to_string()),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::NO_CONTENT {
            return Err(unexpected_status(SOURCE_ID, response).await);
        }

        tracing::debug!("It looks like receipt does exist");
        Ok(())
    }

    async fn fetch_detail(&self, params: &ReceiptParams) -> Result<ParsedReceipt> {
        let url = format!(
            "{}/v1/inns/*/kkts/*/fss/{}/tickets/{}",
            self.base_url,
            params.fiscal_drive_number(),
            params.fiscal_document_number()
        );

        for attempt in 1..=self.max_tries {
            tracing::debug!("Retrieving receipt JSON (attempt {}/{})", attempt, self.max_tries);

            let response = self
                .request(&url)
                .query(&[("fiscalSign", params.fiscal_sign()), ("sendToEmail", "no")])
                .send()
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await?;
                    return self.parse_detail(&body);
                }
                StatusCode::ACCEPTED if attempt < self.max_tries => {
                    tracing::debug!(
                        "Server response was 202, retrying in {:?}",
                        self.retry_delay
                    );
                    self.sleeper.sleep(self.retry_delay).await;
                }
                StatusCode::ACCEPTED => break,
                _ => return Err(unexpected_status(SOURCE_ID, response).await),
            }
        }

        Err(RetrieveError::PollingExhausted {
            tries: self.max_tries,
        })
    }

    fn parse_detail(&self, body: &str) -> Result<ParsedReceipt> {
        let detail: DetailResponse = serde_json::from_str(body)
            .map_err(|e| RetrieveError::parse(SOURCE_ID, format!("invalid receipt JSON: {e}")))?;
        let receipt = detail.document.receipt;

        let local = NaiveDateTime::parse_from_str(receipt.date_time.trim(), API_TIMESTAMP_FORMAT)
            .map_err(|e| {
                RetrieveError::parse(
                    SOURCE_ID,
                    format!("invalid dateTime {:?}: {e}", receipt.date_time),
                )
            })?;
        let created = shift_by_offset(SOURCE_ID, local, self.timezone_offset_hours)?;

        let items = receipt
            .items
            .into_iter()
            .map(|item| {
                Ok(ParsedReceiptItem::new(
                    item.name.trim(),
                    number("quantity", &item.quantity)?,
                    minor_to_major(number("price", &item.price)?),
                    minor_to_major(number("sum", &item.sum)?),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ParsedReceipt {
            fiscal_drive_number: identifier("fiscalDriveNumber", &receipt.fiscal_drive_number)?,
            fiscal_document_number: identifier(
                "fiscalDocumentNumber",
                &receipt.fiscal_document_number,
            )?,
            fiscal_sign: identifier("fiscalSign", &receipt.fiscal_sign)?,
            seller_name: receipt.user.trim().to_string(),
            seller_individual_number: receipt.user_inn.trim().to_string(),
            created,
            items,
        })
    }
}

#[async_trait]
impl ReceiptRetriever for OfficialRegistryRetriever {
    async fn get_receipt(&self, params: &ReceiptParams) -> Retrieval {
        if let Err(e) = self.check_exists(params).await {
            return Retrieval::Failed(e);
        }
        match self.fetch_detail(params).await {
            Ok(receipt) => Retrieval::Found(receipt),
            Err(e) => Retrieval::Failed(e),
        }
    }

    fn source_id(&self) -> &str {
        SOURCE_ID
    }
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    document: DetailDocument,
}

#[derive(Debug, Deserialize)]
struct DetailDocument {
    receipt: RawReceipt,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    fiscal_drive_number: Value,
    fiscal_document_number: Value,
    fiscal_sign: Value,
    user: String,
    user_inn: String,
    date_time: String,
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    name: String,
    price: Number,
    quantity: Number,
    sum: Number,
}

/// Identifiers arrive either as JSON strings or as JSON integers.
fn identifier(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) if n.is_u64() => Ok(n.to_string()),
        other => Err(RetrieveError::parse(
            SOURCE_ID,
            format!("invalid {field}: {other}"),
        )),
    }
}

/// Convert through the textual form so no binary float rounding leaks in.
fn number(field: &str, value: &Number) -> Result<Decimal> {
    let text = value.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| RetrieveError::parse(SOURCE_ID, format!("invalid {field} {text}: {e}")))
}
