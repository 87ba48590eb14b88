//! Append-only forecast persistence. A stored `(forecast_datetime, group)`
//! key is never updated; re-running a training stage only adds new keys.

use std::collections::HashSet;
use std::future::Future;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::FORECAST_INSERT_BATCH;
use crate::db::models::ForecastRow;
use crate::error::Result;
use crate::types::{iso, parse_timestamp, Forecast, ForecastKey, GroupKey};

pub trait ForecastStore {
    /// Every key already persisted.
    fn existing_keys(&self) -> impl Future<Output = Result<HashSet<ForecastKey>>> + Send;

    /// Insert rows whose keys are known to be novel. Returns rows inserted.
    fn insert(&self, forecasts: &[Forecast]) -> impl Future<Output = Result<usize>> + Send;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Keep forecasts whose key is neither stored nor already seen earlier in
/// `forecasts`. Returns the novel rows and the number skipped.
pub fn novel_forecasts(forecasts: Vec<Forecast>, existing: &HashSet<ForecastKey>) -> (Vec<Forecast>, usize) {
    let mut seen: HashSet<ForecastKey> = HashSet::new();
    let mut skipped = 0usize;
    let mut novel = Vec::with_capacity(forecasts.len());
    for f in forecasts {
        let key = f.key();
        if existing.contains(&key) || !seen.insert(key) {
            skipped += 1;
        } else {
            novel.push(f);
        }
    }
    (novel, skipped)
}

pub async fn persist_forecasts<S: ForecastStore>(store: &S, forecasts: Vec<Forecast>) -> Result<PersistReport> {
    let existing = store.existing_keys().await?;
    let (novel, skipped) = novel_forecasts(forecasts, &existing);
    let inserted = if novel.is_empty() { 0 } else { store.insert(&novel).await? };

    // A key can only race in here if another writer ran concurrently.
    if inserted < novel.len() {
        warn!(expected = novel.len(), inserted, "Some novel forecasts were already present at insert time");
    }
    let report = PersistReport {
        inserted,
        skipped: skipped + (novel.len() - inserted),
    };
    info!(inserted = report.inserted, skipped = report.skipped, "Forecasts persisted");
    Ok(report)
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

pub struct SqliteForecastStore {
    pool: sqlx::SqlitePool,
}

/// Optional filters for reading stored forecasts.
#[derive(Debug, Default, Clone)]
pub struct ForecastFilter {
    pub site: Option<String>,
    pub seller_site: Option<String>,
    pub product_id: Option<String>,
}

impl SqliteForecastStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored forecasts, latest `forecast_datetime` first.
    pub async fn list(&self, filter: &ForecastFilter, limit: i64) -> Result<Vec<ForecastRow>> {
        let rows = sqlx::query_as(
            r#"
            SELECT forecast_datetime, forecast, site, seller_site, product_id
            FROM stock_forecast
            WHERE (?1 IS NULL OR site = ?1)
              AND (?2 IS NULL OR seller_site = ?2)
              AND (?3 IS NULL OR product_id = ?3)
            ORDER BY forecast_datetime DESC, site, seller_site, product_id
            LIMIT ?4
            "#,
        )
        .bind(&filter.site)
        .bind(&filter.seller_site)
        .bind(&filter.product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

impl ForecastStore for SqliteForecastStore {
    async fn existing_keys(&self) -> Result<HashSet<ForecastKey>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT forecast_datetime, site, seller_site, product_id FROM stock_forecast",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(at, site, seller_site, product_id)| {
                Some(ForecastKey {
                    forecast_datetime: parse_timestamp(&at)?,
                    group: GroupKey::new(site, seller_site, product_id),
                })
            })
            .collect())
    }

    async fn insert(&self, forecasts: &[Forecast]) -> Result<usize> {
        let created_at = iso(&Utc::now());
        let mut inserted = 0usize;
        for chunk in forecasts.chunks(FORECAST_INSERT_BATCH) {
            let mut tx = self.pool.begin().await?;
            for f in chunk {
                let row = ForecastRow::from(f);
                let result = sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO stock_forecast
                        (forecast_datetime, forecast, site, seller_site, product_id, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&row.forecast_datetime)
                .bind(row.forecast)
                .bind(&row.site)
                .bind(&row.seller_site)
                .bind(&row.product_id)
                .bind(&created_at)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected() as usize;
            }
            tx.commit().await?;
        }
        Ok(inserted)
    }
}
