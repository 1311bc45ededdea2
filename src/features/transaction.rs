//! Raw transaction records
//!
//! A transaction is an immutable bag of named fields as captured upstream.
//! Field lookups are case-insensitive and ignore `_`/`-`, so `deviceRisk`,
//! `device_risk` and `DeviceRisk` all resolve to the same field.

use crate::error::{FraudError, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field names accepted for the transaction amount
const AMOUNT_FIELDS: &[&str] = &["amount"];
/// Field names accepted for the ground-truth label
const LABEL_FIELDS: &[&str] = &["class", "isfraud"];
/// Field names accepted for a wall-clock timestamp
const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "datetime", "date"];
/// Seconds elapsed since the first transaction of the dataset
const ELAPSED_FIELDS: &[&str] = &["time"];
const USER_FIELDS: &[&str] = &["userid", "user", "cardid", "accountid"];
const ID_FIELDS: &[&str] = &["id", "transactionid"];
const MERCHANT_FIELDS: &[&str] = &["merchant", "merchantcategory", "category"];
const LOCATION_FIELDS: &[&str] = &["location", "country"];

/// Epoch values at or above this are interpreted as milliseconds
const EPOCH_MILLIS_CUTOFF: f64 = 1e11;

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value. Numeric strings are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v).filter(|v| v.is_finite()),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Text view of the value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// A raw transaction record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction {
    fields: BTreeMap<String, FieldValue>,
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

impl Transaction {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Build a record from name/value pairs
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        if let Some(value) = self.fields.get(name) {
            return Some(value);
        }
        let wanted = normalize_key(name);
        self.fields
            .iter()
            .find(|(k, _)| normalize_key(k) == wanted)
            .map(|(_, v)| v)
    }

    fn first_field(&self, names: &[&str]) -> Option<&FieldValue> {
        names.iter().find_map(|name| self.field(name))
    }

    /// Numeric value of a field
    pub fn number(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(FieldValue::as_f64)
    }

    /// Text value of a field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }

    /// Iterate over all raw fields
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Transaction amount
    pub fn amount(&self) -> Option<f64> {
        self.first_field(AMOUNT_FIELDS).and_then(FieldValue::as_f64)
    }

    /// Whether an amount field exists at all, parseable or not
    pub fn has_amount_field(&self) -> bool {
        self.first_field(AMOUNT_FIELDS).is_some()
    }

    /// Record identifier, if the record carries one
    pub fn id(&self) -> Option<String> {
        self.first_field(ID_FIELDS).map(field_to_string)
    }

    /// User (or card/account) identifier
    pub fn user_id(&self) -> Option<String> {
        self.first_field(USER_FIELDS).map(field_to_string)
    }

    /// Merchant name or category
    pub fn merchant(&self) -> Option<&str> {
        MERCHANT_FIELDS.iter().find_map(|name| self.text(name))
    }

    /// Location or country text
    pub fn location(&self) -> Option<&str> {
        LOCATION_FIELDS.iter().find_map(|name| self.text(name))
    }

    /// Wall-clock time of the transaction.
    ///
    /// Accepts epoch seconds, epoch milliseconds, RFC 3339 text, or
    /// `YYYY-MM-DD HH:MM:SS` text interpreted as UTC.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.first_field(TIMESTAMP_FIELDS)? {
            FieldValue::Number(v) => epoch_to_datetime(*v),
            FieldValue::Text(s) => {
                let s = s.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Some(naive.and_utc());
                }
                s.parse::<f64>().ok().and_then(epoch_to_datetime)
            }
            FieldValue::Bool(_) => None,
        }
    }

    /// Hour of day and day of week (Sunday = 0).
    ///
    /// Falls back to the elapsed-seconds column when no timestamp is present.
    pub fn clock(&self) -> Option<(u32, u32)> {
        self.timestamp()
            .map(|ts| (ts.hour(), ts.weekday().num_days_from_sunday()))
            .or_else(|| {
                self.elapsed_seconds().filter(|s| *s >= 0.0).map(|s| {
                    let hour = ((s / 3600.0).floor() as u64 % 24) as u32;
                    let day = ((s / 86_400.0).floor() as u64 % 7) as u32;
                    (hour, day)
                })
            })
    }

    /// Seconds elapsed since the start of the dataset (`Time` column)
    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.first_field(ELAPSED_FIELDS).and_then(FieldValue::as_f64)
    }

    /// Ground-truth fraud label.
    ///
    /// Returns `Ok(None)` when the record is unlabeled. `1`/`"1"`/`true`
    /// mean fraud, `0`/`"0"`/`false` mean legitimate; anything else is an
    /// `InvalidInput` error.
    pub fn label(&self) -> Result<Option<bool>> {
        let Some(value) = self.first_field(LABEL_FIELDS) else {
            return Ok(None);
        };
        match value.as_f64() {
            Some(v) if v == 1.0 => Ok(Some(true)),
            Some(v) if v == 0.0 => Ok(Some(false)),
            _ => Err(FraudError::InvalidInput(format!(
                "label must be 0 or 1, got {:?}",
                value
            ))),
        }
    }
}

fn field_to_string(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::Number(v) if v.fract() == 0.0 => format!("{}", *v as i64),
        FieldValue::Number(v) => v.to_string(),
        FieldValue::Bool(b) => b.to_string(),
    }
}

fn epoch_to_datetime(v: f64) -> Option<DateTime<Utc>> {
    if !v.is_finite() || v < 0.0 {
        return None;
    }
    let millis = if v >= EPOCH_MILLIS_CUTOFF { v } else { v * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_case_insensitive_lookup() {
        let tx = Transaction::new()
            .with_field("Amount", 42.5)
            .with_field("device_risk", "high");

        assert_eq!(tx.amount(), Some(42.5));
        assert_eq!(tx.text("deviceRisk"), Some("high"));
        assert_eq!(tx.text("DeviceRisk"), Some("high"));
    }

    #[test]
    fn test_numeric_strings() {
        let tx = Transaction::new().with_field("amount", " 19.99 ");
        assert_eq!(tx.amount(), Some(19.99));

        let tx = Transaction::new().with_field("amount", "abc");
        assert_eq!(tx.amount(), None);
        assert!(tx.has_amount_field());
    }

    #[test]
    fn test_label_parsing() {
        let fraud = Transaction::new().with_field("Class", 1);
        let legit = Transaction::new().with_field("Class", "0");
        let unlabeled = Transaction::new().with_field("amount", 10.0);
        let bad = Transaction::new().with_field("Class", 2);

        assert_eq!(fraud.label().unwrap(), Some(true));
        assert_eq!(legit.label().unwrap(), Some(false));
        assert_eq!(unlabeled.label().unwrap(), None);
        assert!(matches!(bad.label(), Err(FraudError::InvalidInput(_))));
    }

    #[test]
    fn test_timestamp_formats() {
        let rfc = Transaction::new().with_field("timestamp", "2024-03-05T02:15:00Z");
        assert_eq!(rfc.timestamp().unwrap().hour(), 2);

        let plain = Transaction::new().with_field("timestamp", "2024-03-05 23:00:00");
        assert_eq!(plain.timestamp().unwrap().hour(), 23);

        // 2024-03-05T02:15:00Z in seconds and milliseconds
        let secs = Transaction::new().with_field("timestamp", 1_709_604_900.0);
        let millis = Transaction::new().with_field("timestamp", 1_709_604_900_000.0);
        assert_eq!(secs.timestamp(), millis.timestamp());
        assert_eq!(secs.timestamp().unwrap().hour(), 2);
    }

    #[test]
    fn test_json_round_shape() {
        let json = r#"{"Amount": 120.0, "merchant": "grocery", "Class": "0"}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.amount(), Some(120.0));
        assert_eq!(tx.text("merchant"), Some("grocery"));
        assert_eq!(tx.label().unwrap(), Some(false));
    }

    #[test]
    fn test_user_id_from_number() {
        let tx = Transaction::new().with_field("userId", 1234);
        assert_eq!(tx.user_id().as_deref(), Some("1234"));
    }
}
