//! Catalog models: categories and products.

use serde::{Deserialize, Serialize};

/// A product category (e.g. sofas, dining tables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A catalog product as stocked by one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    /// Unit price in the smallest currency unit.
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    /// Price formatted as a decimal amount, e.g. `1249.50`.
    pub fn price_display(&self) -> String {
        let sign = if self.price_cents < 0 { "-" } else { "" };
        let cents = self.price_cents.unsigned_abs();
        format!("{}{}.{:02}", sign, cents / 100, cents % 100)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price_cents: i64, stock_quantity: i64) -> Product {
        Product {
            id: "p1".to_string(),
            name: "Oak Table".to_string(),
            sku: None,
            category_id: None,
            branch_id: None,
            price_cents,
            stock_quantity,
            is_active: true,
        }
    }

    #[test]
    fn test_price_display() {
        assert_eq!(product(124950, 1).price_display(), "1249.50");
        assert_eq!(product(5, 1).price_display(), "0.05");
        assert_eq!(product(-250, 1).price_display(), "-2.50");
    }

    #[test]
    fn test_in_stock() {
        assert!(product(100, 3).in_stock());
        assert!(!product(100, 0).in_stock());
    }

    #[test]
    fn test_missing_columns_use_defaults() {
        let p: Product = serde_json::from_str(r#"{"id":"p9","name":"Lamp"}"#).unwrap();
        assert!(p.is_active);
        assert_eq!(p.price_cents, 0);
        assert_eq!(p.branch_id, None);
    }
}
