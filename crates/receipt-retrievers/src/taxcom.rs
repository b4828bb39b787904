//! Taxcom operator portal.
//!
//! The portal has served two page layouts over time. Both keep the seller in
//! the first two spans of the report header and list items as
//! `table.verticalBlock` blocks, but they differ in where the labels live,
//! how wide an item block is, and how whole quantities are printed. The
//! layout is recognized by the presence of a "№ смены" cell, which only the
//! older layout has.

use crate::error::Result;
use crate::markup::{
    contains, document_root, find_labelled, missing, next_sibling_element, own_text, own_texts,
    parent_element, parse_decimal, parse_portal_timestamp, parse_quantity, selector,
};
use crate::retriever::{base_url, http_client, unexpected_status, ReceiptRetriever, Retrieval};
use async_trait::async_trait;
use receipt_core::{OperatorConfig, ParsedReceipt, ParsedReceiptItem, ReceiptParams, RetrievalConfig};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html};

pub const SOURCE_ID: &str = "taxcom";

pub const DEFAULT_BASE_URL: &str = "http://receipt.taxcom.ru";

const FOUND_MARKER: &str = "h1#receipt_title";
const SHIFT_NUMBER_LABEL: &str = "№ смены";

pub struct TaxcomRetriever {
    client: Client,
    base_url: String,
    parser: TaxcomParser,
}

impl TaxcomRetriever {
    pub fn new(config: &OperatorConfig, retrieval: &RetrievalConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(retrieval)?,
            base_url: base_url(&config.base_url, DEFAULT_BASE_URL),
            parser: TaxcomParser::new(config.timezone_offset_hours),
        })
    }

    async fn fetch(&self, params: &ReceiptParams) -> Result<Option<ParsedReceipt>> {
        let url = format!("{}/v01/show", self.base_url);
        tracing::debug!("Downloading receipt from {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fp", params.fiscal_sign().to_string()),
                ("s", params.amount().to_string()),
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
impl ReceiptRetriever for TaxcomRetriever {
    async fn get_receipt(&self, params: &ReceiptParams) -> Retrieval {
        self.fetch(params).await.into()
    }

    fn source_id(&self) -> &str {
        SOURCE_ID
    }
}

/// Page layout served by the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Labels are plain `td` cells; the page shows the shift number.
    V1,
    /// Labels are spans inside `td` cells.
    V2,
}

impl Layout {
    /// Recognize the layout of a found receipt page.
    pub fn detect(root: ElementRef<'_>) -> Result<Self> {
        let cells = selector(SOURCE_ID, "td")?;
        Ok(if find_labelled(root, &cells, SHIFT_NUMBER_LABEL).is_some() {
            Self::V1
        } else {
            Self::V2
        })
    }

    fn item_stride(self) -> usize {
        match self {
            Self::V1 => 9,
            Self::V2 => 12,
        }
    }

    fn item_total_offset(self) -> usize {
        match self {
            Self::V1 => 3,
            Self::V2 => 4,
        }
    }

    /// V1 pages may close the last item block with summary spans that are
    /// not part of any item; V2 blocks are always complete.
    fn ignores_trailing_spans(self) -> bool {
        matches!(self, Self::V1)
    }

    fn whole_quantity_suffix(self) -> &'static str {
        match self {
            Self::V1 => ",000",
            Self::V2 => ".000",
        }
    }

    /// Value span next to the label with the given text.
    fn value_of(self, root: ElementRef<'_>, label: &str) -> Result<String> {
        let span = selector(SOURCE_ID, "span")?;

        let label_cell = match self {
            Self::V1 => find_labelled(root, &selector(SOURCE_ID, "td")?, label),
            Self::V2 => find_labelled(root, &span, label).and_then(|el| parent_element(&el)),
        };

        label_cell
            .and_then(|cell| next_sibling_element(&cell))
            .and_then(|cell| cell.select(&span).next())
            .map(|el| own_text(&el))
            .ok_or_else(|| missing(SOURCE_ID, label))
    }

    fn created_text(self, root: ElementRef<'_>) -> Result<String> {
        let span = selector(SOURCE_ID, "span")?;

        let value = match self {
            Self::V1 => find_labelled(root, &span, "Приход")
                .and_then(|el| parent_element(&el))
                .and_then(|cell| next_sibling_element(&cell))
                .and_then(|cell| cell.select(&span).nth(1))
                .map(|el| own_text(&el)),
            Self::V2 => report_spans(root)?.into_iter().nth(8),
        };

        value.ok_or_else(|| missing(SOURCE_ID, "creation time"))
    }
}

/// Own texts of the spans in the report header, in document order.
fn report_spans(root: ElementRef<'_>) -> Result<Vec<String>> {
    let spans = selector(SOURCE_ID, "div.receipt_report span")?;
    Ok(root.select(&spans).map(|el| own_text(&el)).collect())
}

pub struct TaxcomParser {
    timezone_offset_hours: i64,
}

impl TaxcomParser {
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
            tracing::debug!("No receipt title found on {} page", SOURCE_ID);
            return Ok(None);
        }

        let layout = Layout::detect(root)?;
        tracing::debug!("Parsing {} page with layout {:?}", SOURCE_ID, layout);

        let header = report_spans(root)?;
        let seller_name = header
            .first()
            .cloned()
            .ok_or_else(|| missing(SOURCE_ID, "seller name"))?;
        let seller_individual_number = header
            .get(1)
            .cloned()
            .ok_or_else(|| missing(SOURCE_ID, "seller tax id"))?;

        let created = parse_portal_timestamp(
            SOURCE_ID,
            &layout.created_text(root)?,
            self.timezone_offset_hours,
        )?;

        Ok(Some(ParsedReceipt {
            fiscal_drive_number: layout.value_of(root, "Зав.№ ФН")?,
            fiscal_document_number: layout.value_of(root, "№ ФД")?,
            fiscal_sign: layout.value_of(root, "ФПД")?,
            seller_name,
            seller_individual_number,
            created,
            items: Self::items(root, layout)?,
        }))
    }

    fn items(root: ElementRef<'_>, layout: Layout) -> Result<Vec<ParsedReceiptItem>> {
        let strings = own_texts(root, &selector(SOURCE_ID, "table.verticalBlock span")?);

        if strings.len() % layout.item_stride() != 0 && !layout.ignores_trailing_spans() {
            return Err(missing(SOURCE_ID, "complete item block"));
        }

        strings
            .chunks_exact(layout.item_stride())
            .map(|block| {
                Ok(ParsedReceiptItem::new(
                    block[0].clone(),
                    parse_quantity(SOURCE_ID, &block[1], layout.whole_quantity_suffix())?,
                    parse_decimal(SOURCE_ID, &block[2])?,
                    parse_decimal(SOURCE_ID, &block[layout.item_total_offset()])?,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrieveError;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FOUND_V1: &str = include_str!("../tests/fixtures/taxcom_receipt_found_v1.html");
    const FOUND_V1_TRAILING: &str =
        include_str!("../tests/fixtures/taxcom_receipt_found_v1_with_trailing_spans.html");
    const FOUND_V2: &str = include_str!("../tests/fixtures/taxcom_receipt_found_v2.html");
    const NOT_FOUND: &str = include_str!("../tests/fixtures/taxcom_receipt_not_found.html");

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("valid decimal")
    }

    fn parse(html: &str) -> ParsedReceipt {
        TaxcomParser::new(7)
            .parse(html)
            .expect("parse should succeed")
            .expect("receipt should be found")
    }

    #[test]
    fn test_layout_detection() {
        for (html, expected) in [(FOUND_V1, Layout::V1), (FOUND_V2, Layout::V2)] {
            let document = Html::parse_document(html);
            let layout = Layout::detect(document_root(&document)).expect("detect layout");
            assert_eq!(layout, expected);
        }
    }

    #[test]
    fn test_parse_if_receipt_found_v1() {
        let receipt = parse(FOUND_V1);

        assert_eq!(receipt.fiscal_drive_number, "8710000100547729");
        assert_eq!(receipt.fiscal_document_number, "55102");
        assert_eq!(receipt.fiscal_sign, "3848832309");
        assert_eq!(receipt.seller_name, "ООО \"Лента\"");
        assert_eq!(receipt.seller_individual_number, "7814148471");
        assert_eq!(
            receipt.created,
            NaiveDate::from_ymd_opt(2017, 8, 6)
                .and_then(|d| d.and_hms_opt(13, 8, 0))
                .expect("valid timestamp")
        );

        assert_eq!(receipt.items.len(), 3);

        assert_eq!(receipt.items[0].name, "Пакет ЛЕНТА майка 9кг");
        assert_eq!(receipt.items[0].quantity, dec("1"));
        assert_eq!(receipt.items[0].price, dec("3.19"));
        assert_eq!(receipt.items[0].total, dec("3.19"));

        assert_eq!(receipt.items[1].name, "Мыло DURU Nature'S Treasures Мед Минд90г");
        assert_eq!(receipt.items[1].quantity, dec("2"));
        assert_eq!(receipt.items[1].total, dec("53.18"));

        assert_eq!(receipt.items[2].quantity.to_string(), "0.316");
        assert_eq!(receipt.items[2].price, dec("56.89"));
        assert_eq!(receipt.items[2].total, dec("17.98"));
    }

    #[test]
    fn test_parse_v1_ignores_spans_after_last_item() {
        let receipt = parse(FOUND_V1_TRAILING);

        assert_eq!(receipt.items, parse(FOUND_V1).items);
        assert_eq!(receipt.items[2].name, "Томаты вес 1 кг");
        assert_eq!(receipt.items[2].total, dec("17.98"));
    }

    #[test]
    fn test_parse_if_receipt_found_v2() {
        let receipt = parse(FOUND_V2);

        assert_eq!(receipt.fiscal_drive_number, "8710000100548077");
        assert_eq!(receipt.fiscal_document_number, "43119");
        assert_eq!(receipt.fiscal_sign, "1514696382");
        assert_eq!(receipt.seller_name, "ООО \"Лента\"");
        assert_eq!(receipt.seller_individual_number, "7814148471");
        assert_eq!(receipt.created.to_string(), "2017-10-21 12:25:00");

        assert_eq!(receipt.items.len(), 3);

        assert_eq!(receipt.items[0].name, "Продукт к/м ДЕРЕВ МОЛ яб/б 2,5% п/п 450г");
        assert_eq!(receipt.items[0].quantity, dec("1"));
        assert_eq!(receipt.items[0].price, dec("40.89"));
        assert_eq!(receipt.items[0].total, dec("40.89"));

        assert_eq!(receipt.items[1].quantity.to_string(), "0.191");
        assert_eq!(receipt.items[1].price, dec("997.06"));
        assert_eq!(receipt.items[1].total, dec("190.44"));

        assert_eq!(receipt.items[2].name, "Т/бумага FAMILIA Plus Маг цвет 2-сл.12шт");
        assert_eq!(receipt.items[2].total, dec("119.99"));
    }

    #[test]
    fn test_parse_if_receipt_not_found() {
        let result = TaxcomParser::new(7).parse(NOT_FOUND).expect("parse should succeed");
        assert!(result.is_none());
    }

    #[test]
    fn test_parse_truncated_item_block_is_an_error() {
        let truncated = FOUND_V2.replacen("<span>ТОВАР</span>", "", 1);
        let err = TaxcomParser::new(7).parse(&truncated).expect_err("incomplete block");
        assert!(matches!(err, RetrieveError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_get_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v01/show"))
            .and(query_param("fp", "1514696382"))
            .and(query_param("s", "351.32"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FOUND_V2))
            .expect(1)
            .mount(&server)
            .await;

        let config = OperatorConfig {
            base_url: server.uri(),
            timezone_offset_hours: 7,
        };
        let retriever =
            TaxcomRetriever::new(&config, &RetrievalConfig::default()).expect("create retriever");
        let params = ReceiptParams::new(
            "8710000100548077",
            "43119",
            "1514696382",
            NaiveDate::from_ymd_opt(2017, 10, 21)
                .and_then(|d| d.and_hms_opt(19, 25, 0))
                .expect("valid timestamp"),
            dec("351.32"),
        )
        .expect("valid params");

        let receipt = retriever
            .get_receipt(&params)
            .await
            .into_receipt()
            .expect("receipt should be found");
        assert_eq!(receipt.fiscal_document_number, "43119");
        assert_eq!(retriever.source_id(), "taxcom");
    }

    #[tokio::test]
    async fn test_get_receipt_if_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = OperatorConfig {
            base_url: server.uri(),
            timezone_offset_hours: 7,
        };
        let retriever =
            TaxcomRetriever::new(&config, &RetrievalConfig::default()).expect("create retriever");
        let params = ReceiptParams::new(
            "1",
            "2",
            "3",
            NaiveDate::from_ymd_opt(2017, 10, 21)
                .and_then(|d| d.and_hms_opt(19, 25, 0))
                .expect("valid timestamp"),
            dec("1.00"),
        )
        .expect("valid params");

        assert!(matches!(
            retriever.get_receipt(&params).await,
            Retrieval::Failed(RetrieveError::UnexpectedStatus { status: 500, .. })
        ));
    }
}
