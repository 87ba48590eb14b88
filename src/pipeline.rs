//! One pipeline run: pretreatment (fetch, derive, write) followed by training
//! (re-read, fit, persist). Everything a run needs travels in [`RunContext`].

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::api::health::HealthState;
use crate::config::{Config, SourceKind};
use crate::db::forecasts::{persist_forecasts, ForecastStore, PersistReport, SqliteForecastStore};
use crate::db::series::load_series;
use crate::db::writer::{DerivedSink, DerivedWriter, SqliteDerivedSink, WriteReport};
use crate::deriver::{derive, DeriveReport};
use crate::error::Result;
use crate::forecast::{train_all, TrainingReport};
use crate::source::{fetch_all, ObservationSource, RestObservationSource, SqliteObservationSource};

/// Run-scoped state, created once per run and passed down explicitly.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub cfg: Config,
}

impl RunContext {
    pub fn new(cfg: Config) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ")),
            started_at,
            cfg,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PretreatmentReport {
    pub derive: DeriveReport,
    pub write: WriteReport,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrainingStageReport {
    pub training: TrainingReport,
    pub persist: PersistReport,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub pretreatment: PretreatmentReport,
    pub training: TrainingStageReport,
}

/// Fetch the whole observation log, derive transitions and write the series.
/// Structural failures abort before anything is written; batch failures are
/// reported, not raised.
pub async fn run_pretreatment<S, K>(ctx: &RunContext, source: &S, sink: K) -> Result<PretreatmentReport>
where
    S: ObservationSource,
    K: DerivedSink,
{
    let raw = fetch_all(source, ctx.cfg.fetch_page_size).await?;
    if raw.is_empty() {
        warn!(run_id = %ctx.run_id, "Observation log is empty, nothing to derive");
        return Ok(PretreatmentReport::default());
    }

    let (derived, derive_report) = derive(&raw, ctx.cfg.imputation)?;
    let write = DerivedWriter::new(sink, ctx.cfg.write_batch_size).write(&derived).await;

    info!(
        run_id = %ctx.run_id,
        rows = write.rows_written,
        failed_batches = write.batches_failed,
        "Pretreatment complete",
    );
    Ok(PretreatmentReport { derive: derive_report, write })
}

/// Re-read the pretreated series, train every group and persist novel
/// forecasts.
pub async fn run_training<F: ForecastStore>(
    ctx: &RunContext,
    pool: &sqlx::SqlitePool,
    store: &F,
) -> Result<TrainingStageReport> {
    let series = load_series(pool).await?;
    let (forecasts, training) = train_all(series, ctx.cfg.train_concurrency, ctx.cfg.max_ar_order).await;
    let persist = persist_forecasts(store, forecasts).await?;

    info!(
        run_id = %ctx.run_id,
        inserted = persist.inserted,
        skipped = persist.skipped,
        "Training stage complete",
    );
    Ok(TrainingStageReport { training, persist })
}

/// Both stages against the local store, reading observations from the
/// configured source. The outcome is published to `health`.
pub async fn run_pipeline(ctx: &RunContext, pool: &sqlx::SqlitePool, health: &HealthState) -> Result<RunReport> {
    info!(run_id = %ctx.run_id, source = ?ctx.cfg.source, "Pipeline run starting");
    health.run_started(&ctx.run_id);

    let result = run_stages(ctx, pool).await;
    match &result {
        Ok(report) => health.run_finished(&report.training.training),
        Err(_) => health.run_failed(),
    }
    result
}

async fn run_stages(ctx: &RunContext, pool: &sqlx::SqlitePool) -> Result<RunReport> {
    let sink = SqliteDerivedSink::new(pool.clone());
    let pretreatment = match ctx.cfg.source {
        SourceKind::Sqlite => {
            let source = SqliteObservationSource::new(pool.clone());
            run_pretreatment(ctx, &source, sink).await?
        }
        SourceKind::Rest => {
            let source = RestObservationSource::new(&ctx.cfg)?;
            run_pretreatment(ctx, &source, sink).await?
        }
    };

    let store = SqliteForecastStore::new(pool.clone());
    let training = run_training(ctx, pool, &store).await?;

    Ok(RunReport { pretreatment, training })
}
