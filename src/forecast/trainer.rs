use std::collections::BTreeMap;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::{FORECAST_HORIZON, MAX_GRID_POINTS, MIN_DISTINCT_POINTS, TREND_WINDOW};
use crate::db::series::SeriesPoint;
use crate::forecast::model::{ArModel, FitError};
use crate::forecast::series::{daily, distinct_points, grid_len, infer_cadence, reindex, rolling_mean};
use crate::types::{Forecast, GroupKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    InsufficientPoints { distinct: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InsufficientPoints { distinct } => {
                write!(f, "only {distinct} distinct time points (need {MIN_DISTINCT_POINTS})")
            }
        }
    }
}

/// Result of training one group.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    Forecast(Vec<Forecast>),
    Skipped(SkipReason),
    Failed(FitError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrainingReport {
    pub groups: usize,
    pub forecast: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows: usize,
}

/// Fit one group's series and forecast `FORECAST_HORIZON` periods past its
/// last observation.
pub fn train_group(key: &GroupKey, points: &[SeriesPoint], max_order: usize) -> GroupOutcome {
    let distinct = distinct_points(points);
    if distinct.len() < MIN_DISTINCT_POINTS {
        return GroupOutcome::Skipped(SkipReason::InsufficientPoints { distinct: distinct.len() });
    }

    let (first, last) = (distinct[0].at, distinct[distinct.len() - 1].at);
    let mut cadence = infer_cadence(&distinct);
    if grid_len(first, last, cadence) > MAX_GRID_POINTS && cadence != daily() {
        debug!(group = %key, "Inferred cadence too fine for the span, using daily");
        cadence = daily();
    }
    let len = grid_len(first, last, cadence);
    if len > MAX_GRID_POINTS {
        return GroupOutcome::Failed(FitError::SeriesTooLong(len));
    }

    let grid = reindex(&distinct, cadence);
    let raw: Vec<f64> = grid.iter().map(|p| p.stock_status).collect();
    let trend = rolling_mean(&raw, TREND_WINDOW);

    let model = match ArModel::select(&trend, max_order) {
        Ok(m) => m,
        Err(e) => return GroupOutcome::Failed(e),
    };
    let values = match model.forecast(&trend, FORECAST_HORIZON) {
        Ok(v) => v,
        Err(e) => return GroupOutcome::Failed(e),
    };
    debug!(group = %key, order = model.order(), aic = model.aic(), sigma2 = model.sigma2(), "Model selected");

    let anchor = grid[grid.len() - 1].at;
    let forecasts = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| Forecast {
            forecast_datetime: anchor + cadence * (i as i32 + 1),
            forecast: v.clamp(0.0, 1.0),
            site: key.site.clone(),
            seller_site: key.seller_site_id.clone(),
            product_id: key.product_id.clone(),
        })
        .collect();
    GroupOutcome::Forecast(forecasts)
}

/// Train every group on a bounded pool of blocking workers. Groups share no
/// state, so completion order does not matter; output is sorted by group key
/// then `forecast_datetime`.
pub async fn train_all(
    series: BTreeMap<GroupKey, Vec<SeriesPoint>>,
    concurrency: usize,
    max_order: usize,
) -> (Vec<Forecast>, TrainingReport) {
    let mut report = TrainingReport { groups: series.len(), ..TrainingReport::default() };

    let results: Vec<_> = stream::iter(series)
        .map(|(key, points)| async move {
            let task_key = key.clone();
            let joined =
                tokio::task::spawn_blocking(move || train_group(&task_key, &points, max_order)).await;
            (key, joined)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut forecasts = Vec::new();
    for (key, joined) in results {
        match joined {
            Ok(GroupOutcome::Forecast(rows)) => {
                report.forecast += 1;
                forecasts.extend(rows);
            }
            Ok(GroupOutcome::Skipped(reason)) => {
                report.skipped += 1;
                info!(group = %key, "Skipped: {reason}");
            }
            Ok(GroupOutcome::Failed(e)) => {
                report.failed += 1;
                warn!(group = %key, "Model fit failed: {e}");
            }
            Err(e) => {
                report.failed += 1;
                error!(group = %key, "Training task aborted: {e}");
            }
        }
    }

    forecasts.sort_by(|a, b| {
        (&a.site, &a.seller_site, &a.product_id, a.forecast_datetime)
            .cmp(&(&b.site, &b.seller_site, &b.product_id, b.forecast_datetime))
    });
    report.rows = forecasts.len();

    info!(
        groups = report.groups,
        forecast = report.forecast,
        skipped = report.skipped,
        failed = report.failed,
        rows = report.rows,
        "Training complete",
    );
    (forecasts, report)
}
