use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::db::forecasts::{ForecastFilter, SqliteForecastStore};
use crate::db::models::ForecastRow;
use crate::error::AppError;

const DEFAULT_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/forecasts", get(get_forecasts))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ForecastsQuery {
    pub site: Option<String>,
    pub seller_site: Option<String>,
    pub product_id: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub running: bool,
    pub last_run_id: Option<String>,
    pub last_run_finished_at_ms: Option<i64>,
    pub last_run_groups_forecast: u64,
    pub last_run_groups_skipped: u64,
    pub last_run_groups_failed: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let h = &state.health;
    let finished_at = h.last_run_finished_at_ms();
    let status = match (finished_at, h.last_run_ok()) {
        (0, _) => "starting",
        (_, true) => "ok",
        (_, false) => "degraded",
    };
    Json(HealthResponse {
        status,
        running: h.running(),
        last_run_id: h.last_run_id(),
        last_run_finished_at_ms: (finished_at > 0).then_some(finished_at),
        last_run_groups_forecast: h.groups_forecast.load(Ordering::Relaxed),
        last_run_groups_skipped: h.groups_skipped.load(Ordering::Relaxed),
        last_run_groups_failed: h.groups_failed.load(Ordering::Relaxed),
    })
}

async fn get_forecasts(
    State(state): State<ApiState>,
    Query(params): Query<ForecastsQuery>,
) -> Result<Json<Vec<ForecastRow>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 10_000);
    let filter = ForecastFilter {
        site: params.site,
        seller_site: params.seller_site,
        product_id: params.product_id,
    };
    let rows = SqliteForecastStore::new(state.pool.clone()).list(&filter, limit).await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;
    use crate::db::forecasts::persist_forecasts;
    use crate::types::Forecast;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn forecasts_handler_filters_rows() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let store = SqliteForecastStore::new(pool.clone());
        let at = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let rows = ["P1", "P2"]
            .iter()
            .map(|p| Forecast {
                forecast_datetime: at,
                forecast: 0.5,
                site: "amazon".to_string(),
                seller_site: "amz".to_string(),
                product_id: p.to_string(),
            })
            .collect();
        persist_forecasts(&store, rows).await.unwrap();

        let state = ApiState { pool, health: Arc::new(HealthState::new()) };
        let query = ForecastsQuery {
            site: Some("amazon".to_string()),
            seller_site: None,
            product_id: Some("P1".to_string()),
            limit: None,
        };
        let Json(body) = get_forecasts(State(state), Query(query)).await.unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].product_id, "P1");
        assert_eq!(body[0].forecast_datetime, "2025-04-01T00:00:00Z");
    }

    #[tokio::test]
    async fn health_reports_starting_before_first_run() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let state = ApiState { pool, health: Arc::new(HealthState::new()) };
        let Json(body) = get_health(State(state)).await;
        assert_eq!(body.status, "starting");
        assert_eq!(body.last_run_finished_at_ms, None);
    }
}
