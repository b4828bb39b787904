//! Platforma OFD operator portal.
//!
//! Receipts are looked up by fiscal drive number and fiscal sign. The page is
//! a stack of `check-row` blocks with a left label column and a right value
//! column. When the cash register printed a barcode for each item, item rows
//! have a fixed width; otherwise each product is its own block whose tax rows
//! vary in number.

use crate::error::Result;
use crate::markup::{
    ancestor_with_class, contains, document_root, find_labelled, missing, own_text, own_texts,
    parent_element, parse_decimal, parse_portal_timestamp, selector,
};
use crate::retriever::{base_url, http_client, unexpected_status, ReceiptRetriever, Retrieval};
use async_trait::async_trait;
use receipt_core::{OperatorConfig, ParsedReceipt, ParsedReceiptItem, ReceiptParams, RetrievalConfig};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html};

pub const SOURCE_ID: &str = "platforma-ofd";

pub const DEFAULT_BASE_URL: &str = "https://lk.platformaofd.ru";

const FOUND_MARKER: &str = "i.ofdicon-download";
const BARCODE_LABEL: &str = "штриховой код EAN13";
const QUANTITY_PRICE_SEPARATOR: &str = " х ";

pub struct PlatformaOfdRetriever {
    client: Client,
    base_url: String,
    parser: PlatformaOfdParser,
}

impl PlatformaOfdRetriever {
    pub fn new(config: &OperatorConfig, retrieval: &RetrievalConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(retrieval)?,
            base_url: base_url(&config.base_url, DEFAULT_BASE_URL),
            parser: PlatformaOfdParser::new(config.timezone_offset_hours),
        })
    }

    async fn fetch(&self, params: &ReceiptParams) -> Result<Option<ParsedReceipt>> {
        let url = format!("{}/web/noauth/cheque", self.base_url);
        tracing::debug!("Downloading receipt from {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fn", params.fiscal_drive_number()),
                ("fp", params.fiscal_sign()),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(unexpected_status(SOURCE_ID, response).await);
        }

        let html = response.text().await?;
        self.parser.parse(&html)
    }
}

#[async_trait]
impl ReceiptRetriever for PlatformaOfdRetriever {
    async fn get_receipt(&self, params: &ReceiptParams) -> Retrieval {
        self.fetch(params).await.into()
    }

    fn source_id(&self) -> &str {
        SOURCE_ID
    }
}

/// How item rows are laid out on a receipt page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemLayout {
    /// Fixed-width rows of name, quantity x price, barcode label, barcode,
    /// VAT label, VAT, total label and total
    BarcodeRows,
    /// One block per product whose first value is quantity x price and whose
    /// last value is the total, with any number of tax rows in between
    ProductBlocks,
}

impl ItemLayout {
    fn detect(root: ElementRef<'_>) -> Result<Self> {
        let divs = selector(SOURCE_ID, "div")?;
        Ok(if find_labelled(root, &divs, BARCODE_LABEL).is_some() {
            Self::BarcodeRows
        } else {
            Self::ProductBlocks
        })
    }
}

const BARCODE_ROW_WIDTH: usize = 8;
const BARCODE_ROW_TOTAL: usize = 7;

pub struct PlatformaOfdParser {
    timezone_offset_hours: i64,
}

impl PlatformaOfdParser {
    #[must_use]
    pub fn new(timezone_offset_hours: i64) -> Self {
        Self {
            timezone_offset_hours,
        }
    }

    /// Parse a receipt page; `Ok(None)` means the portal has no such receipt.
    pub fn parse(&self, html: &str) -> Result<Option<ParsedReceipt>> {
        let document = Html::parse_document(html);
        let root = document_root(&document);

        if !contains(root, &selector(SOURCE_ID, FOUND_MARKER)?) {
            tracing::debug!("No receipt marker found on {} page", SOURCE_ID);
            return Ok(None);
        }

        let (seller_name, seller_individual_number) = Self::seller(root)?;
        let created = parse_portal_timestamp(
            SOURCE_ID,
            &Self::value_of(root, "Приход")?,
            self.timezone_offset_hours,
        )?;

        Ok(Some(ParsedReceipt {
            fiscal_drive_number: Self::value_of(root, "N ФН")?,
            fiscal_document_number: Self::value_of(root, "N ФД")?,
            fiscal_sign: Self::value_of(root, "ФП")?,
            seller_name,
            seller_individual_number,
            created,
            items: Self::items(root)?,
        }))
    }

    /// Right-column text of the row labelled `label`.
    fn value_of(root: ElementRef<'_>, label: &str) -> Result<String> {
        let labels = selector(SOURCE_ID, "div.check-col-left")?;
        let values = selector(SOURCE_ID, "div.check-col-right")?;

        find_labelled(root, &labels, label)
            .and_then(|el| ancestor_with_class(&el, "check-row"))
            .and_then(|row| row.select(&values).next())
            .map(|el| own_text(&el))
            .ok_or_else(|| missing(SOURCE_ID, label))
    }

    fn seller(root: ElementRef<'_>) -> Result<(String, String)> {
        let lines: Vec<String> = root
            .select(&selector(SOURCE_ID, "div.check-top > div")?)
            .map(|el| own_text(&el))
            .collect();

        let name = lines.first().ok_or_else(|| missing(SOURCE_ID, "seller name"))?;
        let tax_id = lines
            .get(2)
            .map(|line| line.trim_start_matches("ИНН").trim().to_string())
            .ok_or_else(|| missing(SOURCE_ID, "seller tax id"))?;

        Ok((name.clone(), tax_id))
    }

    fn items(root: ElementRef<'_>) -> Result<Vec<ParsedReceiptItem>> {
        match ItemLayout::detect(root)? {
            ItemLayout::BarcodeRows => Self::barcode_rows(root),
            ItemLayout::ProductBlocks => Self::product_blocks(root),
        }
    }

    fn barcode_rows(root: ElementRef<'_>) -> Result<Vec<ParsedReceiptItem>> {
        let sections = selector(SOURCE_ID, "div.check-section")?;
        let product_name = selector(SOURCE_ID, "div.check-product-name")?;
        let cells = selector(
            SOURCE_ID,
            r#"div[class*="check-product-name"], div[class*="check-col"]"#,
        )?;

        let strings: Vec<String> = root
            .select(&sections)
            .filter(|section| contains(*section, &product_name))
            .flat_map(|section| own_texts(section, &cells))
            .collect();

        if strings.len() % BARCODE_ROW_WIDTH != 0 {
            return Err(missing(SOURCE_ID, "complete item row"));
        }

        strings
            .chunks_exact(BARCODE_ROW_WIDTH)
            .map(|row| Self::item(&row[0], &row[1], &row[BARCODE_ROW_TOTAL]))
            .collect()
    }

    fn product_blocks(root: ElementRef<'_>) -> Result<Vec<ParsedReceiptItem>> {
        let product_name = selector(SOURCE_ID, "div.check-product-name")?;
        let values = selector(SOURCE_ID, "div.check-col-right")?;

        root.select(&product_name)
            .map(|name| {
                let block = parent_element(&name).ok_or_else(|| missing(SOURCE_ID, "item block"))?;
                let cells: Vec<String> = block.select(&values).map(|el| own_text(&el)).collect();
                match cells.as_slice() {
                    [quantity_price, .., total] => Self::item(&own_text(&name), quantity_price, total),
                    _ => Err(missing(SOURCE_ID, "item total")),
                }
            })
            .collect()
    }

    fn item(name: &str, quantity_price: &str, total: &str) -> Result<ParsedReceiptItem> {
        let (quantity, price) = quantity_price
            .split_once(QUANTITY_PRICE_SEPARATOR)
            .ok_or_else(|| missing(SOURCE_ID, "quantity and price"))?;

        Ok(ParsedReceiptItem::new(
            name,
            parse_decimal(SOURCE_ID, quantity)?,
            parse_decimal(SOURCE_ID, price)?,
            parse_decimal(SOURCE_ID, total)?,
        ))
    }
}
