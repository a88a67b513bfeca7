//! Receipt data model
//!
//! Every field is optional: upstream systems send partial receipts and a
//! missing section or field simply produces no output. Keys accept both
//! the snake_case names below and the camelCase names used by the
//! point-of-sale backend (`tableBody`, `tableFooter`, `count`, ...).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Receipt payload could not be decoded
#[derive(Debug, Error)]
#[error("Invalid receipt payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// A number or a string, as sent by upstream for amounts and discounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Text as it appears on paper
    pub fn display(&self) -> String {
        match self {
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptHeader {
    pub title: Option<String>,
    #[serde(alias = "subtitles", alias = "subtitleLines", alias = "subtitle_lines")]
    pub subtitle: Option<Vec<String>>,
    /// Base64 encoded PNG/JPEG printed above the title
    pub logo: Option<String>,
}

/// Label/value pair used by the body and the payment lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledValue {
    #[serde(alias = "title")]
    pub label: Option<String>,
    pub value: Option<FieldValue>,
}

impl LabeledValue {
    pub fn new(label: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            label: Some(label.into()),
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: Option<String>,
    #[serde(alias = "count")]
    pub quantity: Option<i64>,
    #[serde(alias = "unitSum", alias = "unit_sum")]
    pub sum: Option<f64>,
}

impl ReceiptItem {
    pub fn new(name: impl Into<String>, quantity: i64, sum: f64) -> Self {
        Self {
            name: Some(name.into()),
            quantity: Some(quantity),
            sum: Some(sum),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptTotals {
    pub discount: Option<FieldValue>,
    #[serde(alias = "amountDue", alias = "topayment", alias = "toPayment")]
    pub amount_due: Option<FieldValue>,
    pub payments: Option<Vec<LabeledValue>>,
}

/// Structured receipt content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptDocument {
    pub header: Option<ReceiptHeader>,
    pub body: Option<Vec<LabeledValue>>,
    #[serde(alias = "tableBody", alias = "table_body")]
    pub items: Option<Vec<ReceiptItem>>,
    #[serde(alias = "tableFooter", alias = "table_footer")]
    pub totals: Option<ReceiptTotals>,
    pub footer: Option<Vec<String>>,
}

impl ReceiptDocument {
    /// Decode a receipt from JSON
    ///
    /// Accepts the bare document or the backend envelope
    /// `{"success": .., "data": {...}}`. A `null` envelope body decodes to
    /// an empty document.
    pub fn from_json(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut value: serde_json::Value = serde_json::from_slice(payload)?;
        if let Some(data) = value.as_object_mut().and_then(|obj| obj.remove("data")) {
            value = data;
        }
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }
}
