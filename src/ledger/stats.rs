//! Profit statistics over the sales table.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate};
use serde::Serialize;

use super::day_start_millis;
use crate::models::record::Record;
use crate::models::table::fields;

const UNKNOWN_PRODUCT: &str = "未知产品";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatsRange {
    Today,
    /// From the most recent Sunday.
    Week,
    Month,
    /// Both days inclusive.
    Custom { start: NaiveDate, end: NaiveDate },
}

impl StatsRange {
    /// `[start, end]` in epoch milliseconds. Calendar days come from the
    /// local clock; each day spans UTC midnight to UTC midnight, the same
    /// convention dates are stored with.
    pub fn bounds(&self, now: DateTime<Local>) -> (i64, i64) {
        let today = now.date_naive();
        let (start, end) = match *self {
            StatsRange::Today => (today, today),
            StatsRange::Week => {
                let back = i64::from(today.weekday().num_days_from_sunday());
                (today - Duration::days(back), today)
            }
            StatsRange::Month => (today.with_day(1).unwrap_or(today), today),
            StatsRange::Custom { start, end } => (start, end),
        };
        (
            day_start_millis(start),
            day_start_millis(end + Duration::days(1)) - 1,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductStats {
    pub quantity: f64,
    pub sales: f64,
    pub cost: f64,
    pub profit: f64,
}

impl ProductStats {
    pub fn profit_rate(&self) -> f64 {
        rate(self.profit, self.sales)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfitStats {
    pub total_sales: f64,
    pub total_cost: f64,
    pub total_profit: f64,
    /// Percent of sales; 0 when there were no sales.
    pub profit_rate: f64,
    /// Keyed by product name, so iteration is alphabetical.
    pub by_product: BTreeMap<String, ProductStats>,
}

impl ProfitStats {
    /// Aggregates sales whose date falls within `range`.
    /// Records without a date are treated as dated at the epoch.
    pub fn compute(sales: &[Record], range: StatsRange, now: DateTime<Local>) -> Self {
        let (start, end) = range.bounds(now);
        let mut stats = ProfitStats::default();

        for record in sales {
            let date = record.millis_field(fields::SALE_DATE).unwrap_or(0);
            if date < start || date > end {
                continue;
            }

            let amount = record.num_field(fields::SALE_TOTAL);
            let cost = record.num_field(fields::COST_TOTAL);
            let profit = record.num_field(fields::PROFIT);
            let quantity = record.num_field(fields::SALE_QUANTITY);
            let product = record
                .str_field(fields::PRODUCT_NAME)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN_PRODUCT);

            stats.total_sales += amount;
            stats.total_cost += cost;
            stats.total_profit += profit;

            let entry = stats.by_product.entry(product.to_string()).or_default();
            entry.quantity += quantity;
            entry.sales += amount;
            entry.cost += cost;
            entry.profit += profit;
        }

        stats.profit_rate = rate(stats.total_profit, stats.total_sales);
        stats
    }
}

fn rate(profit: f64, sales: f64) -> f64 {
    if sales > 0.0 {
        super::pricing::round2(profit / sales * 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sale(id: &str, day: NaiveDate, product: &str, amount: f64, cost: f64) -> Record {
        let mut f = serde_json::Map::new();
        f.insert(fields::SALE_DATE.into(), json!(day_start_millis(day)));
        f.insert(fields::PRODUCT_NAME.into(), json!(product));
        f.insert(fields::SALE_QUANTITY.into(), json!(2));
        f.insert(fields::SALE_TOTAL.into(), json!(amount));
        f.insert(fields::COST_TOTAL.into(), json!(cost));
        f.insert(fields::PROFIT.into(), json!(amount - cost));
        Record {
            id: id.to_string(),
            fields: f,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local
            .from_local_datetime(&NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap())
            .earliest()
            .unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_custom_range_includes_whole_end_day() {
        let sales = vec![
            sale("a", day(2025, 3, 1), "Soap", 20.0, 8.0),
            sale("b", day(2025, 3, 31), "Soap", 10.0, 4.0),
            sale("c", day(2025, 4, 1), "Soap", 99.0, 1.0),
        ];
        let range = StatsRange::Custom { start: day(2025, 3, 1), end: day(2025, 3, 31) };
        let stats = ProfitStats::compute(&sales, range, at(2025, 6, 1, 12));

        assert_eq!(stats.total_sales, 30.0);
        assert_eq!(stats.total_profit, 18.0);
        assert_eq!(stats.profit_rate, 60.0);
        assert_eq!(stats.by_product["Soap"].quantity, 4.0);
    }

    #[test]
    fn test_month_range_starts_on_first() {
        let sales = vec![
            sale("a", day(2025, 5, 31), "Soap", 20.0, 8.0),
            sale("b", day(2025, 6, 1), "Candle", 10.0, 4.0),
        ];
        let stats = ProfitStats::compute(&sales, StatsRange::Month, at(2025, 6, 15, 12));
        assert_eq!(stats.total_sales, 10.0);
        assert!(stats.by_product.contains_key("Candle"));
        assert!(!stats.by_product.contains_key("Soap"));
    }

    #[test]
    fn test_week_starts_on_sunday() {
        // 2025-06-18 is a Wednesday; the week began on Sunday 2025-06-15.
        let sales = vec![
            sale("a", day(2025, 6, 14), "Soap", 5.0, 1.0),
            sale("b", day(2025, 6, 15), "Soap", 7.0, 2.0),
        ];
        let stats = ProfitStats::compute(&sales, StatsRange::Week, at(2025, 6, 18, 12));
        assert_eq!(stats.total_sales, 7.0);
    }

    #[test]
    fn test_sale_entered_today_counts_as_today() {
        let now = Local::now();
        let date = super::super::date_to_millis(&now.format("%Y-%m-%d").to_string()).unwrap();
        let mut rec = sale("a", now.date_naive(), "Soap", 5.0, 1.0);
        rec.fields.insert(fields::SALE_DATE.into(), json!(date));

        let stats = ProfitStats::compute(&[rec], StatsRange::Today, now);
        assert_eq!(stats.total_sales, 5.0);
        assert_eq!(super::super::millis_to_date(date), now.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_empty_sales_have_zero_rate() {
        let stats = ProfitStats::compute(&[], StatsRange::Today, at(2025, 6, 18, 12));
        assert_eq!(stats.profit_rate, 0.0);
        assert!(stats.by_product.is_empty());
    }

    #[test]
    fn test_unnamed_product_grouped_as_unknown() {
        let mut rec = sale("a", day(2025, 6, 18), "", 5.0, 1.0);
        rec.fields.remove(fields::PRODUCT_NAME);
        let stats = ProfitStats::compute(&[rec], StatsRange::Today, at(2025, 6, 18, 12));
        assert_eq!(stats.by_product[UNKNOWN_PRODUCT].sales, 5.0);
        assert_eq!(stats.by_product[UNKNOWN_PRODUCT].profit_rate(), 80.0);
    }
}
