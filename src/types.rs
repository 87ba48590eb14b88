use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One record as delivered by the observation store, before any coercion.
pub type RawObservation = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Group key
// ---------------------------------------------------------------------------

/// One tracked product on one marketplace seller listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub site: String,
    pub seller_site_id: String,
    pub product_id: String,
}

impl GroupKey {
    pub fn new(
        site: impl Into<String>,
        seller_site_id: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            seller_site_id: seller_site_id.into(),
            product_id: product_id.into(),
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.site, self.seller_site_id, self.product_id)
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One polled availability snapshot, after coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: GroupKey,
    /// 1 = in stock, 0 = out of stock.
    pub stock_status: u8,
    pub insert_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Derived record
// ---------------------------------------------------------------------------

/// An observation enriched with transition metadata. Serializes to the
/// pretreated-series wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRecord {
    pub product_id: String,
    pub site: String,
    #[serde(alias = "seller_site")]
    pub seller_site_id: String,
    pub stock_status: u8,
    /// `None` on the first row of a group.
    pub prev_stock_status: Option<u8>,
    pub insert_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub stockout_time: Option<DateTime<Utc>>,
    pub restock_time: Option<DateTime<Utc>>,
}

impl DerivedRecord {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(&self.site, &self.seller_site_id, &self.product_id)
    }
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub forecast_datetime: DateTime<Utc>,
    pub forecast: f64,
    pub site: String,
    pub seller_site: String,
    pub product_id: String,
}

impl Forecast {
    pub fn key(&self) -> ForecastKey {
        ForecastKey {
            forecast_datetime: self.forecast_datetime,
            group: GroupKey::new(&self.site, &self.seller_site, &self.product_id),
        }
    }
}

/// Uniqueness key of a persisted forecast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForecastKey {
    pub forecast_datetime: DateTime<Utc>,
    pub group: GroupKey,
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Coerce a loosely typed availability flag to 0/1.
/// Returns `None` when the value is missing or unrecognisable.
pub fn coerce_status(value: Option<&serde_json::Value>) -> Option<u8> {
    use serde_json::Value;
    match value? {
        Value::Bool(b) => Some(u8::from(*b)),
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|f| u8::from(f != 0.0)),
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(1)
            } else if s.eq_ignore_ascii_case("false") {
                Some(0)
            } else {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| u8::from(f != 0.0))
            }
        }
        _ => None,
    }
}

/// Parse an ISO-8601 timestamp. Naive values are taken as UTC; a bare date
/// is midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Coerce a loosely typed field to a timestamp. Missing, null or unparsable
/// values yield `None`.
pub fn coerce_timestamp(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    match value? {
        serde_json::Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Coerce an identifier field to a string. Numbers are accepted; null or
/// missing becomes the empty string.
pub fn coerce_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Canonical wire form: RFC 3339, UTC, `Z` suffix.
pub fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn status_coercion_accepts_common_shapes() {
        assert_eq!(coerce_status(Some(&json!(true))), Some(1));
        assert_eq!(coerce_status(Some(&json!(false))), Some(0));
        assert_eq!(coerce_status(Some(&json!(1))), Some(1));
        assert_eq!(coerce_status(Some(&json!(0.0))), Some(0));
        assert_eq!(coerce_status(Some(&json!("1"))), Some(1));
        assert_eq!(coerce_status(Some(&json!("TRUE"))), Some(1));
        assert_eq!(coerce_status(Some(&json!("0"))), Some(0));
    }

    #[test]
    fn status_coercion_rejects_garbage() {
        assert_eq!(coerce_status(None), None);
        assert_eq!(coerce_status(Some(&json!(null))), None);
        assert_eq!(coerce_status(Some(&json!("in stock"))), None);
        assert_eq!(coerce_status(Some(&json!([1]))), None);
    }

    #[test]
    fn timestamp_shapes() {
        let want = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-01T12:30:00Z"), Some(want));
        assert_eq!(parse_timestamp("2025-03-01T21:30:00+09:00"), Some(want));
        assert_eq!(parse_timestamp("2025-03-01T12:30:00"), Some(want));
        assert_eq!(parse_timestamp("2025-03-01 12:30:00"), Some(want));
        assert_eq!(parse_timestamp("2025-03-01T12:30:00.000000"), Some(want));
        assert_eq!(
            parse_timestamp("2025-03-01"),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("NaT"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn non_string_timestamps_are_invalid() {
        assert_eq!(coerce_timestamp(Some(&json!(1_700_000_000))), None);
        assert_eq!(coerce_timestamp(Some(&json!(null))), None);
        assert_eq!(coerce_timestamp(None), None);
    }

    #[test]
    fn iso_round_trips_through_parse() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(iso(&ts), "2025-03-01T00:00:00Z");
        assert_eq!(parse_timestamp(&iso(&ts)), Some(ts));
    }

    #[test]
    fn derived_record_reads_seller_site_alias() {
        let rec: DerivedRecord = serde_json::from_value(json!({
            "product_id": "P1",
            "site": "rakuten",
            "seller_site": "shop-a",
            "stock_status": 1,
            "prev_stock_status": null,
            "insert_time": "2025-03-01T00:00:00Z",
            "update_time": "2025-03-01T00:00:00Z",
            "stockout_time": null,
            "restock_time": null
        }))
        .unwrap();
        assert_eq!(rec.seller_site_id, "shop-a");
        assert_eq!(rec.prev_stock_status, None);
    }
}
