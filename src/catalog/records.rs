//! Wire shapes of the Kara catalog API.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::PriceTier;

/// Standard Kara list envelope: `{ success, data, total?, timestamp }`.
///
/// `data` stays untyped here; records are decoded one by one with
/// [`Fetched::decode`].
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<Value>,
    pub total: Option<u64>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
}

/// An upstream record that did not decode into its typed shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    /// The record's `id` (or `product_id`), else its position in the list.
    pub key: String,
    pub error: String,
}

/// Decoded records of one list fetch, plus the ones that did not decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub records: Vec<T>,
    pub rejected: Vec<RejectedRecord>,
}

impl<T: DeserializeOwned> Fetched<T> {
    pub fn decode(values: Vec<Value>) -> Self {
        let mut fetched = Self { records: Vec::with_capacity(values.len()), rejected: Vec::new() };
        for (index, value) in values.into_iter().enumerate() {
            let key = record_key(&value, index);
            match serde_json::from_value::<T>(value) {
                Ok(record) => fetched.records.push(record),
                Err(e) => fetched.rejected.push(RejectedRecord { key, error: e.to_string() }),
            }
        }
        fetched
    }
}

fn record_key(value: &Value, index: usize) -> String {
    ["id", "product_id"]
        .iter()
        .find_map(|field| match value.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| format!("#{index}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub version: String,
}

/// Upstream identifier. Kara sends numbers for most entities but strings
/// for some warehouses, so both are accepted and kept as text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl<'de> Deserialize<'de> for ExternalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw { Int(i64), Str(String) }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => ExternalId(n.to_string()),
            Raw::Str(s) => ExternalId(s),
        })
    }
}

fn active_by_default() -> bool { true }
fn one() -> i32 { 1 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: ExternalId,
    pub name: String,
    pub parent_id: Option<ExternalId>,
    pub description: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandRecord {
    pub id: ExternalId,
    pub name: String,
    pub description: Option<String>,
    pub country: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ExternalId,
    pub name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub description: Option<String>,
    pub category_id: ExternalId,
    pub brand_id: Option<ExternalId>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    pub weight: Option<Decimal>,
    /// Either `"20x30x2"` or a structured object, depending on the Kara version.
    pub dimensions: Option<serde_json::Value>,
}

impl ProductRecord {
    pub fn dimensions_text(&self) -> Option<String> {
        match &self.dimensions {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub product_id: ExternalId,
    pub price_type: PriceTier,
    pub price: Decimal,
    pub compare_price: Option<Decimal>,
    #[serde(default = "one")]
    pub min_quantity: i32,
    pub effective_from: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ExternalId,
    pub warehouse_id: ExternalId,
    pub quantity: i32,
    #[serde(default)]
    pub reserved_quantity: i32,
    #[serde(default)]
    pub min_stock_level: i32,
    pub last_updated: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_product_envelope() {
        let raw = r#"{
            "success": true,
            "data": [{"id": 12, "name": "خودکار آبی", "sku": "PEN-B-01", "barcode": null,
                      "description": "", "category_id": 3, "brand_id": null, "is_active": true,
                      "weight": 12.5, "dimensions": {"l": 14, "w": 1}, "created_at": "x", "updated_at": "y"}],
            "total": 1,
            "timestamp": "2026-10-18T08:00:00Z"
        }"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert!(env.success);
        let fetched = Fetched::<ProductRecord>::decode(env.data);
        assert!(fetched.rejected.is_empty());
        let p = &fetched.records[0];
        assert_eq!(p.id, ExternalId::new("12"));
        assert_eq!(p.category_id.as_str(), "3");
        assert_eq!(p.dimensions_text().as_deref(), Some(r#"{"l":14,"w":1}"#));
    }

    #[test]
    fn test_parses_price_and_stock_records() {
        let price: PriceRecord = serde_json::from_str(
            r#"{"product_id": "12", "price_type": "wholesale", "price": 900, "compare_price": 1100, "min_quantity": 10, "effective_from": "2026-01-01T00:00:00Z"}"#,
        ).unwrap();
        assert_eq!(price.price_type, PriceTier::Wholesale);
        assert_eq!(price.min_quantity, 10);

        let stock: StockRecord = serde_json::from_str(r#"{"product_id": 12, "warehouse_id": "WH-1", "quantity": 50}"#).unwrap();
        assert_eq!(stock.reserved_quantity, 0);
        assert_eq!(stock.warehouse_id.as_str(), "WH-1");
    }

    #[test]
    fn test_failed_envelope_without_data() {
        let env: Envelope = serde_json::from_str(r#"{"success": false, "message": "token expired"}"#).unwrap();
        assert!(!env.success);
        assert!(env.data.is_empty());
    }

    #[test]
    fn test_malformed_record_is_set_aside() {
        let env: Envelope = serde_json::from_str(
            r#"{"success": true, "data": [
                {"product_id": 12, "price_type": "retail", "price": 1000},
                {"product_id": 13, "price_type": "special", "price": 900},
                {"price_type": "retail", "price": "n/a"}
            ]}"#,
        )
        .unwrap();
        let fetched = Fetched::<PriceRecord>::decode(env.data);

        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.records[0].product_id.as_str(), "12");
        assert_eq!(fetched.rejected.len(), 2);
        assert_eq!(fetched.rejected[0].key, "13");
        assert!(fetched.rejected[0].error.contains("special"));
        assert_eq!(fetched.rejected[1].key, "#2");
    }
}
