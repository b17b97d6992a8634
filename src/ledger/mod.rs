//! In-memory view of the three tables plus the bookkeeping arithmetic
//! built on top of it.

pub mod entries;
pub mod pricing;
pub mod stats;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::client::TableClient;
use crate::errors::AppError;
use crate::models::record::Record;
use crate::models::table::{fields, TableKind};

/// Latest known purchase price of a material.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialPrice {
    pub price: f64,
    pub unit: String,
}

/// Read-through cache of every record, replaced wholesale on reload.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub purchases: Vec<Record>,
    pub formulas: Vec<Record>,
    pub sales: Vec<Record>,
}

impl Ledger {
    /// Lists all three tables concurrently. Every listing runs to completion;
    /// the cache is only replaced if all of them succeeded.
    pub async fn reload(&mut self, client: &TableClient) -> Result<(), AppError> {
        let (purchases, formulas, sales) = futures::join!(
            client.list(TableKind::Purchase),
            client.list(TableKind::Formula),
            client.list(TableKind::Sales),
        );

        for (kind, result) in [
            (TableKind::Purchase, purchases.as_ref().err()),
            (TableKind::Formula, formulas.as_ref().err()),
            (TableKind::Sales, sales.as_ref().err()),
        ] {
            if let Some(e) = result {
                tracing::warn!(table = %kind, "reload failed: {}", e);
            }
        }

        let (purchases, formulas, sales) = (purchases?, formulas?, sales?);
        self.purchases = purchases;
        self.formulas = formulas;
        self.sales = sales;
        tracing::info!(
            purchases = self.purchases.len(),
            formulas = self.formulas.len(),
            sales = self.sales.len(),
            "ledger reloaded"
        );
        Ok(())
    }

    /// Unit price and unit per material; later purchases win.
    pub fn material_prices(&self) -> BTreeMap<String, MaterialPrice> {
        self.purchases
            .iter()
            .filter_map(|r| {
                let name = r.str_field(fields::MATERIAL_NAME).filter(|n| !n.is_empty())?;
                Some((
                    name.to_string(),
                    MaterialPrice {
                        price: r.num_field(fields::PURCHASE_UNIT_PRICE),
                        unit: r.str_field(fields::UNIT).unwrap_or_default().to_string(),
                    },
                ))
            })
            .collect()
    }

    /// Distinct product names, in formula order.
    pub fn products(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for name in self
            .formulas
            .iter()
            .filter_map(|r| r.str_field(fields::PRODUCT_NAME))
        {
            if !seen.iter().any(|s: &String| s == name) {
                seen.push(name.to_string());
            }
        }
        seen
    }

    /// Unit cost recorded on the formula of `product`, if any.
    pub fn unit_cost(&self, product: &str) -> Option<f64> {
        self.formulas
            .iter()
            .find(|r| r.str_field(fields::PRODUCT_NAME) == Some(product))
            .map(|r| r.num_field(fields::UNIT_COST))
    }

    /// Sales, most recent first.
    pub fn sales_by_date_desc(&self) -> Vec<&Record> {
        let mut sorted: Vec<&Record> = self.sales.iter().collect();
        sorted.sort_by_key(|r| std::cmp::Reverse(r.millis_field(fields::SALE_DATE).unwrap_or(0)));
        sorted
    }
}

/// `YYYY-MM-DD` to epoch milliseconds at UTC midnight of that day.
pub fn date_to_millis(date: &str) -> anyhow::Result<i64> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("invalid date '{}': {}", date, e))?;
    Ok(day_start_millis(day))
}

/// Epoch milliseconds at UTC midnight of `day`. Stored dates and range
/// bounds both use this, so a date reads back as the same day in any zone.
pub fn day_start_millis(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Epoch milliseconds to a `YYYY-MM-DD` string (UTC), empty for 0.
pub fn millis_to_date(millis: i64) -> String {
    if millis == 0 {
        return String::new();
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, fields: serde_json::Value) -> Record {
        Record {
            id: id.into(),
            fields: fields.as_object().unwrap().clone(),
        }
    }

    #[test]
    fn test_material_prices_last_purchase_wins() {
        let ledger = Ledger {
            purchases: vec![
                rec("p1", json!({"原料名称": "oil", "采购单价": 10.0, "单位": "kg"})),
                rec("p2", json!({"原料名称": "oil", "采购单价": 12.0, "单位": "kg"})),
                rec("p3", json!({"规格": "no name"})),
            ],
            ..Ledger::default()
        };

        let prices = ledger.material_prices();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["oil"], MaterialPrice { price: 12.0, unit: "kg".into() });
    }

    #[test]
    fn test_products_are_distinct_in_order() {
        let ledger = Ledger {
            formulas: vec![
                rec("f1", json!({"产品名称": "Soap", "单位成本": 3.3})),
                rec("f2", json!({"产品名称": "Candle"})),
                rec("f3", json!({"产品名称": "Soap"})),
            ],
            ..Ledger::default()
        };
        assert_eq!(ledger.products(), vec!["Soap", "Candle"]);
        assert_eq!(ledger.unit_cost("Soap"), Some(3.3));
        assert_eq!(ledger.unit_cost("Brick"), None);
    }

    #[test]
    fn test_sales_sorted_newest_first() {
        let ledger = Ledger {
            sales: vec![
                rec("old", json!({"销售日期": 1000})),
                rec("new", json!({"销售日期": 3000})),
                rec("undated", json!({})),
            ],
            ..Ledger::default()
        };
        let sorted = ledger.sales_by_date_desc();
        let ids: Vec<&str> = sorted.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "undated"]);
    }

    #[test]
    fn test_date_conversions() {
        // UTC midnight regardless of the machine's zone.
        assert_eq!(date_to_millis("2025-03-01").unwrap(), 1_740_787_200_000);
        assert!(date_to_millis("03/01/2025").is_err());
        assert_eq!(millis_to_date(1_735_689_600_000), "2025-01-01");
        assert_eq!(millis_to_date(0), "");
    }

    #[test]
    fn test_dates_read_back_as_the_same_day() {
        for date in ["2025-01-01", "2025-02-28", "2025-03-01", "2024-12-31", "2024-02-29"] {
            assert_eq!(millis_to_date(date_to_millis(date).unwrap()), date);
        }
    }
}
