use chrono::{DateTime, Utc};

use crate::types::{DerivedRecord, Observation};

/// Derive transition metadata for one group. `rows` must all share a group
/// key and be in arrival order; they are stable-sorted by `insert_time` here,
/// so equal timestamps keep arrival order.
///
/// Returns the deduplicated records and how many duplicates were dropped.
pub fn derive_group(mut rows: Vec<Observation>) -> (Vec<DerivedRecord>, usize) {
    rows.sort_by_key(|o| o.insert_time);

    let mut derived = Vec::with_capacity(rows.len());
    let mut prev: Option<u8> = None;
    let mut last_stockout: Option<DateTime<Utc>> = None;
    let mut last_restock: Option<DateTime<Utc>> = None;

    for o in rows {
        match (prev, o.stock_status) {
            (Some(1), 0) => last_stockout = Some(o.insert_time),
            (Some(0), 1) => last_restock = Some(o.insert_time),
            _ => {}
        }
        derived.push(DerivedRecord {
            product_id: o.key.product_id,
            site: o.key.site,
            seller_site_id: o.key.seller_site_id,
            stock_status: o.stock_status,
            prev_stock_status: prev,
            insert_time: o.insert_time,
            update_time: o.update_time,
            stockout_time: last_stockout,
            restock_time: last_restock,
        });
        prev = Some(o.stock_status);
    }

    let before = derived.len();
    let deduped = keep_last_per_insert_time(derived);
    let dropped = before - deduped.len();
    (deduped, dropped)
}

/// Rows are sorted, so duplicates are adjacent; keep the last of each run.
fn keep_last_per_insert_time(rows: Vec<DerivedRecord>) -> Vec<DerivedRecord> {
    let mut out: Vec<DerivedRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        match out.last_mut() {
            Some(last) if last.insert_time == row.insert_time => *last = row,
            _ => out.push(row),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupKey;
    use chrono::{Duration, TimeZone};

    fn t(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn obs(status: u8, day: i64) -> Observation {
        Observation {
            key: GroupKey::new("amazon", "amz", "P1"),
            stock_status: status,
            insert_time: t(day),
            update_time: t(day),
        }
    }

    #[test]
    fn stockout_then_restock() {
        let (rows, dropped) = derive_group(vec![obs(1, 0), obs(0, 1), obs(1, 2)]);
        assert_eq!(dropped, 0);

        assert_eq!(rows[0].prev_stock_status, None);
        assert_eq!(rows[0].stockout_time, None);
        assert_eq!(rows[0].restock_time, None);

        assert_eq!(rows[1].prev_stock_status, Some(1));
        assert_eq!(rows[1].stockout_time, Some(t(1)));
        assert_eq!(rows[1].restock_time, None);

        assert_eq!(rows[2].prev_stock_status, Some(0));
        assert_eq!(rows[2].stockout_time, Some(t(1)));
        assert_eq!(rows[2].restock_time, Some(t(2)));
    }

    #[test]
    fn sorts_out_of_order_arrivals() {
        let (rows, _) = derive_group(vec![obs(1, 2), obs(1, 0), obs(0, 1)]);
        let times: Vec<_> = rows.iter().map(|r| r.insert_time).collect();
        assert_eq!(times, vec![t(0), t(1), t(2)]);
        assert_eq!(rows[2].restock_time, Some(t(2)));
    }

    #[test]
    fn forward_fill_keeps_latest_transition() {
        let statuses = [1, 0, 0, 1, 1, 0, 0];
        let input = statuses.iter().enumerate().map(|(d, &s)| obs(s, d as i64)).collect();
        let (rows, _) = derive_group(input);

        let stockouts: Vec<_> = rows.iter().map(|r| r.stockout_time).collect();
        assert_eq!(
            stockouts,
            vec![None, Some(t(1)), Some(t(1)), Some(t(1)), Some(t(1)), Some(t(5)), Some(t(5))]
        );
        let restocks: Vec<_> = rows.iter().map(|r| r.restock_time).collect();
        assert_eq!(
            restocks,
            vec![None, None, None, Some(t(3)), Some(t(3)), Some(t(3)), Some(t(3))]
        );
    }

    #[test]
    fn no_transition_without_change() {
        let (rows, _) = derive_group(vec![obs(0, 0), obs(0, 1), obs(0, 2)]);
        assert!(rows.iter().all(|r| r.stockout_time.is_none() && r.restock_time.is_none()));
    }

    #[test]
    fn duplicate_insert_time_keeps_last_arrival() {
        let (rows, dropped) = derive_group(vec![obs(1, 0), obs(1, 5), obs(0, 5)]);
        assert_eq!(dropped, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].insert_time, t(5));
        assert_eq!(rows[1].stock_status, 0);
        // The dropped duplicate still counts as the preceding poll.
        assert_eq!(rows[1].prev_stock_status, Some(1));
        assert_eq!(rows[1].stockout_time, Some(t(5)));
    }
}
