use crate::error::{AppError, Result};

/// Table the acquisition jobs append raw observations to.
pub const REST_TABLE: &str = "trn_ranked_item_stock";

/// Rows per observation page. End of data is signalled by an empty page.
pub const FETCH_PAGE_SIZE: usize = 1000;

/// Derived records per upsert batch.
pub const WRITE_BATCH_SIZE: usize = 500;

/// Groups with fewer distinct timestamps than this are not trained.
pub const MIN_DISTINCT_POINTS: usize = 3;

/// Future periods emitted per trained group.
pub const FORECAST_HORIZON: usize = 10;

/// Trailing rolling-mean window applied to the re-indexed status series.
pub const TREND_WINDOW: usize = 7;

/// Highest AR order considered during order selection.
pub const MAX_AR_ORDER: usize = 5;

/// Re-indexing at the inferred cadence falls back to daily above this many grid points.
pub const MAX_GRID_POINTS: usize = 20_000;

/// Forecast rows per insert statement batch.
pub const FORECAST_INSERT_BATCH: usize = 500;

/// Where to read the raw observation log from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// `observations` table in the local SQLite store.
    Sqlite,
    /// PostgREST-style table endpoint.
    Rest,
}

/// Fallback for unparsable or missing timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImputationPolicy {
    /// Minimum valid value of the column across the whole log.
    #[default]
    GlobalMinimum,
    /// Minimum valid value within the row's group, else the global minimum.
    GroupMinimum,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Keep serving the read API after the pipeline finishes (SERVE_API)
    pub serve_api: bool,
    pub source: SourceKind,
    /// Base URL of the REST store, e.g. `https://xyz.supabase.co` (REST_BASE_URL)
    pub rest_base_url: String,
    pub rest_api_key: String,
    pub rest_table: String,
    pub fetch_page_size: usize,
    pub write_batch_size: usize,
    pub imputation: ImputationPolicy,
    /// Worker pool size for per-group training (TRAIN_CONCURRENCY)
    pub train_concurrency: usize,
    pub max_ar_order: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            db_path: "forecaster.db".to_string(),
            api_port: 3000,
            serve_api: false,
            source: SourceKind::Sqlite,
            rest_base_url: String::new(),
            rest_api_key: String::new(),
            rest_table: REST_TABLE.to_string(),
            fetch_page_size: FETCH_PAGE_SIZE,
            write_batch_size: WRITE_BATCH_SIZE,
            imputation: ImputationPolicy::GlobalMinimum,
            train_concurrency: default_concurrency(),
            max_ar_order: MAX_AR_ORDER,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let source = match std::env::var("OBSERVATION_SOURCE")
            .unwrap_or_else(|_| "sqlite".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "sqlite" => SourceKind::Sqlite,
            "rest" => SourceKind::Rest,
            other => {
                return Err(AppError::Config(format!(
                    "OBSERVATION_SOURCE must be `sqlite` or `rest`, got `{other}`"
                )))
            }
        };

        let imputation = match std::env::var("TIMESTAMP_IMPUTATION")
            .unwrap_or_else(|_| "global".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "global" => ImputationPolicy::GlobalMinimum,
            "group" => ImputationPolicy::GroupMinimum,
            other => {
                return Err(AppError::Config(format!(
                    "TIMESTAMP_IMPUTATION must be `global` or `group`, got `{other}`"
                )))
            }
        };

        let cfg = Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            db_path: std::env::var("DB_PATH").unwrap_or(defaults.db_path),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            serve_api: std::env::var("SERVE_API")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
            source,
            rest_base_url: std::env::var("REST_BASE_URL").unwrap_or_default(),
            rest_api_key: std::env::var("REST_API_KEY").unwrap_or_default(),
            rest_table: std::env::var("REST_TABLE").unwrap_or(defaults.rest_table),
            fetch_page_size: std::env::var("FETCH_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(FETCH_PAGE_SIZE),
            write_batch_size: std::env::var("WRITE_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(WRITE_BATCH_SIZE),
            imputation,
            train_concurrency: std::env::var("TRAIN_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.train_concurrency),
            max_ar_order: std::env::var("MAX_AR_ORDER")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(MAX_AR_ORDER),
        };

        if cfg.source == SourceKind::Rest && cfg.rest_base_url.is_empty() {
            return Err(AppError::Config(
                "REST_BASE_URL is required when OBSERVATION_SOURCE=rest".to_string(),
            ));
        }

        Ok(cfg)
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
