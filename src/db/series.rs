use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::Result;
use crate::types::{parse_timestamp, GroupKey};

/// One point of a group's status series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub at: DateTime<Utc>,
    pub stock_status: f64,
}

#[derive(sqlx::FromRow)]
struct SeriesRow {
    site: String,
    seller_site_id: String,
    product_id: String,
    stock_status: i64,
    update_time: String,
}

/// Re-read the pretreated series, grouped and ordered by `update_time`.
pub async fn load_series(pool: &sqlx::SqlitePool) -> Result<BTreeMap<GroupKey, Vec<SeriesPoint>>> {
    let rows: Vec<SeriesRow> = sqlx::query_as(
        r#"
        SELECT site, seller_site_id, product_id, stock_status, update_time
        FROM stock_pretreatment
        ORDER BY site, seller_site_id, product_id, update_time, insert_time
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut groups: BTreeMap<GroupKey, Vec<SeriesPoint>> = BTreeMap::new();
    let mut unparsable = 0usize;
    for row in rows {
        let Some(at) = parse_timestamp(&row.update_time) else {
            unparsable += 1;
            continue;
        };
        groups
            .entry(GroupKey::new(row.site, row.seller_site_id, row.product_id))
            .or_default()
            .push(SeriesPoint { at, stock_status: row.stock_status as f64 });
    }
    if unparsable > 0 {
        warn!(rows = unparsable, "Skipped pretreated rows with unparsable update_time");
    }

    // Text order matches time order only for a uniform format.
    for points in groups.values_mut() {
        points.sort_by_key(|p| p.at);
    }
    Ok(groups)
}
