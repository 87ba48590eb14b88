//! Row types for the pretreated-series and forecast tables.

use serde::Serialize;

use crate::types::{iso, DerivedRecord, Forecast};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PretreatmentRow {
    pub product_id: String,
    pub site: String,
    pub seller_site_id: String,
    pub stock_status: i64,
    pub prev_stock_status: i64,
    pub insert_time: String,
    pub update_time: String,
    pub stockout_time: Option<String>,
    pub restock_time: Option<String>,
}

impl From<&DerivedRecord> for PretreatmentRow {
    /// `prev_stock_status` is NOT NULL in the sink, so a group's first row is
    /// written as 0. Absent transition times stay NULL.
    fn from(r: &DerivedRecord) -> Self {
        Self {
            product_id: r.product_id.clone(),
            site: r.site.clone(),
            seller_site_id: r.seller_site_id.clone(),
            stock_status: i64::from(r.stock_status),
            prev_stock_status: i64::from(r.prev_stock_status.unwrap_or(0)),
            insert_time: iso(&r.insert_time),
            update_time: iso(&r.update_time),
            stockout_time: r.stockout_time.as_ref().map(iso),
            restock_time: r.restock_time.as_ref().map(iso),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ForecastRow {
    pub forecast_datetime: String,
    pub forecast: f64,
    pub site: String,
    pub seller_site: String,
    pub product_id: String,
}

impl From<&Forecast> for ForecastRow {
    fn from(f: &Forecast) -> Self {
        Self {
            forecast_datetime: iso(&f.forecast_datetime),
            forecast: f.forecast,
            site: f.site.clone(),
            seller_site: f.seller_site.clone(),
            product_id: f.product_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn first_row_narrows_prev_status_and_keeps_null_times() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let rec = DerivedRecord {
            product_id: "P1".to_string(),
            site: "yahoo".to_string(),
            seller_site_id: "store".to_string(),
            stock_status: 1,
            prev_stock_status: None,
            insert_time: ts,
            update_time: ts,
            stockout_time: None,
            restock_time: None,
        };
        let row = PretreatmentRow::from(&rec);
        assert_eq!(row.prev_stock_status, 0);
        assert_eq!(row.insert_time, "2025-03-01T09:00:00Z");
        assert_eq!(row.stockout_time, None);

        let json = serde_json::to_value(&row).unwrap();
        assert!(json["restock_time"].is_null());
    }
}
