//! State transition deriver: raw observation log in, stockout/restock
//! series out.

pub mod coerce;
pub mod transitions;

use std::collections::BTreeMap;

use tracing::info;

use crate::config::ImputationPolicy;
use crate::error::Result;
use crate::types::{DerivedRecord, GroupKey, Observation, RawObservation};

pub use coerce::{coerce_log, CoerceStats, REQUIRED_COLUMNS};
pub use transitions::derive_group;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeriveReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub groups: usize,
    pub duplicates_dropped: usize,
    pub coerce: CoerceStats,
}

/// Derive the full record set. Output is ordered by group key, then
/// `insert_time`.
pub fn derive(raw: &[RawObservation], policy: ImputationPolicy) -> Result<(Vec<DerivedRecord>, DeriveReport)> {
    let (observations, coerce) = coerce_log(raw, policy)?;
    let mut report = DeriveReport {
        rows_in: raw.len(),
        coerce,
        ..DeriveReport::default()
    };

    let groups = partition(observations);
    report.groups = groups.len();

    let mut derived = Vec::with_capacity(raw.len());
    for (_, rows) in groups {
        let (records, dropped) = derive_group(rows);
        report.duplicates_dropped += dropped;
        derived.extend(records);
    }
    report.rows_out = derived.len();

    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        groups = report.groups,
        duplicates = report.duplicates_dropped,
        "Derived {} records across {} groups",
        report.rows_out,
        report.groups,
    );
    Ok((derived, report))
}

/// Group observations by key, preserving arrival order inside each group.
fn partition(observations: Vec<Observation>) -> BTreeMap<GroupKey, Vec<Observation>> {
    let mut groups: BTreeMap<GroupKey, Vec<Observation>> = BTreeMap::new();
    for o in observations {
        groups.entry(o.key.clone()).or_default().push(o);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    fn raw(site: &str, product: &str, status: serde_json::Value, ts: &str) -> RawObservation {
        json!({
            "site": site,
            "seller_site_id": "seller",
            "product_id": product,
            "stock_status": status,
            "insert_time": ts,
            "update_time": ts,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn groups_are_independent() {
        let log = vec![
            raw("rakuten", "P1", json!(1), "2025-03-01T00:00:00"),
            raw("yahoo", "P1", json!(0), "2025-03-02T00:00:00"),
            raw("rakuten", "P1", json!(0), "2025-03-03T00:00:00"),
            raw("yahoo", "P1", json!(1), "2025-03-04T00:00:00"),
        ];
        let (rows, report) = derive(&log, ImputationPolicy::GlobalMinimum).unwrap();
        assert_eq!(report.groups, 2);
        assert_eq!(rows.len(), 4);

        let rakuten: Vec<_> = rows.iter().filter(|r| r.site == "rakuten").collect();
        assert_eq!(rakuten[1].prev_stock_status, Some(1));
        assert!(rakuten[1].stockout_time.is_some());
        assert!(rakuten[1].restock_time.is_none());

        let yahoo: Vec<_> = rows.iter().filter(|r| r.site == "yahoo").collect();
        assert_eq!(yahoo[0].prev_stock_status, None);
        assert!(yahoo[1].restock_time.is_some());
        assert!(yahoo[1].stockout_time.is_none());
    }

    #[test]
    fn duplicates_resolve_to_later_arrival() {
        let log = vec![
            raw("shop", "P2", json!(1), "2025-03-05T00:00:00"),
            raw("shop", "P2", json!(0), "2025-03-05T00:00:00"),
        ];
        let (rows, report) = derive(&log, ImputationPolicy::GlobalMinimum).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stock_status, 0);
        assert_eq!(report.duplicates_dropped, 1);
    }

    #[test]
    fn first_row_of_every_group_has_no_history() {
        let log = vec![
            raw("a", "P1", json!(0), "2025-03-02T00:00:00"),
            raw("b", "P1", json!(1), "2025-03-01T00:00:00"),
            raw("a", "P1", json!(1), "2025-03-01T00:00:00"),
        ];
        let (rows, _) = derive(&log, ImputationPolicy::GlobalMinimum).unwrap();
        let mut seen = std::collections::HashSet::new();
        for r in &rows {
            if seen.insert(r.key()) {
                assert_eq!(r.prev_stock_status, None);
                assert!(r.stockout_time.is_none() && r.restock_time.is_none());
            }
        }
    }

    #[test]
    fn structural_error_propagates() {
        let mut row = raw("a", "P1", json!(1), "2025-03-01T00:00:00");
        row.remove("site");
        let err = derive(&[row], ImputationPolicy::GlobalMinimum).unwrap_err();
        assert!(matches!(err, AppError::MissingColumn("site")));
    }
}
