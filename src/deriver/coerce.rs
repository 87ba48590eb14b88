//! Boundary between the loosely typed log and [`Observation`]. All
//! malformed-field handling lives here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::ImputationPolicy;
use crate::error::{AppError, Result};
use crate::types::{coerce_status, coerce_text, coerce_timestamp, GroupKey, Observation, RawObservation};

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "site",
    "seller_site_id",
    "product_id",
    "stock_status",
    "insert_time",
    "update_time",
];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoerceStats {
    /// Rows whose status was missing or unrecognisable and became 0.
    pub statuses_coerced: usize,
    pub insert_times_imputed: usize,
    pub update_times_imputed: usize,
}

/// A column counts as present if at least one record carries it.
pub fn check_columns(raw: &[RawObservation]) -> Result<()> {
    for column in REQUIRED_COLUMNS {
        if !raw.iter().any(|r| r.contains_key(column)) {
            return Err(AppError::MissingColumn(column));
        }
    }
    Ok(())
}

struct Parsed {
    key: GroupKey,
    stock_status: u8,
    insert_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
}

/// Convert the raw log into observations, in arrival order. No row is dropped:
/// bad statuses become 0 and bad timestamps are imputed per `policy`.
pub fn coerce_log(raw: &[RawObservation], policy: ImputationPolicy) -> Result<(Vec<Observation>, CoerceStats)> {
    let mut stats = CoerceStats::default();
    if raw.is_empty() {
        return Ok((Vec::new(), stats));
    }
    check_columns(raw)?;

    let parsed: Vec<Parsed> = raw
        .iter()
        .map(|r| {
            let stock_status = coerce_status(r.get("stock_status")).unwrap_or_else(|| {
                stats.statuses_coerced += 1;
                0
            });
            Parsed {
                key: GroupKey::new(
                    coerce_text(r.get("site")),
                    coerce_text(r.get("seller_site_id")),
                    coerce_text(r.get("product_id")),
                ),
                stock_status,
                insert_time: coerce_timestamp(r.get("insert_time")),
                update_time: coerce_timestamp(r.get("update_time")),
            }
        })
        .collect();

    let insert_fallback = Fallback::build(&parsed, policy, |p| p.insert_time);
    let update_fallback = Fallback::build(&parsed, policy, |p| p.update_time);

    let mut observations = Vec::with_capacity(parsed.len());
    for p in parsed {
        let insert_time = match p.insert_time {
            Some(ts) => ts,
            None => {
                stats.insert_times_imputed += 1;
                insert_fallback.for_group(&p.key).ok_or(AppError::NoValidTimestamps("insert_time"))?
            }
        };
        let update_time = match p.update_time {
            Some(ts) => ts,
            None => {
                stats.update_times_imputed += 1;
                update_fallback.for_group(&p.key).ok_or(AppError::NoValidTimestamps("update_time"))?
            }
        };
        observations.push(Observation {
            key: p.key,
            stock_status: p.stock_status,
            insert_time,
            update_time,
        });
    }

    if stats.insert_times_imputed + stats.update_times_imputed > 0 {
        warn!(
            insert_time = stats.insert_times_imputed,
            update_time = stats.update_times_imputed,
            policy = ?policy,
            "Imputed unparsable timestamps; ordering of these rows is approximate",
        );
    }
    if stats.statuses_coerced > 0 {
        warn!(rows = stats.statuses_coerced, "Coerced invalid stock_status values to 0");
    }

    Ok((observations, stats))
}

/// Minimum valid timestamp of one column, globally and per group.
struct Fallback {
    global: Option<DateTime<Utc>>,
    per_group: Option<HashMap<GroupKey, DateTime<Utc>>>,
}

impl Fallback {
    fn build(parsed: &[Parsed], policy: ImputationPolicy, field: impl Fn(&Parsed) -> Option<DateTime<Utc>>) -> Self {
        let global = parsed.iter().filter_map(&field).min();
        let per_group = match policy {
            ImputationPolicy::GlobalMinimum => None,
            ImputationPolicy::GroupMinimum => {
                let mut mins: HashMap<GroupKey, DateTime<Utc>> = HashMap::new();
                for p in parsed {
                    if let Some(ts) = field(p) {
                        mins.entry(p.key.clone())
                            .and_modify(|m| *m = (*m).min(ts))
                            .or_insert(ts);
                    }
                }
                Some(mins)
            }
        };
        Self { global, per_group }
    }

    fn for_group(&self, key: &GroupKey) -> Option<DateTime<Utc>> {
        self.per_group
            .as_ref()
            .and_then(|m| m.get(key).copied())
            .or(self.global)
    }
}
