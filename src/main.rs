use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stock_forecaster::api::health::HealthState;
use stock_forecaster::api::routes::{router, ApiState};
use stock_forecaster::config::Config;
use stock_forecaster::db;
use stock_forecaster::error::Result;
use stock_forecaster::pipeline::{run_pipeline, RunContext, RunReport};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&format!("sqlite:{}", cfg.db_path)).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Pipeline run ---
    let health = Arc::new(HealthState::new());
    let ctx = RunContext::new(cfg.clone());
    let report = run_pipeline(&ctx, &pool, &health).await?;
    log_run_summary(&ctx, &report);

    if !cfg.serve_api {
        return Ok(());
    }

    // --- HTTP API server ---
    let app = router(ApiState { pool: pool.clone(), health });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

fn log_run_summary(ctx: &RunContext, report: &RunReport) {
    let p = &report.pretreatment;
    let t = &report.training;
    let elapsed_ms = (chrono::Utc::now() - ctx.started_at).num_milliseconds();
    info!(
        event = "RUN_COMPLETE",
        run_id = %ctx.run_id,
        elapsed_ms,
        "RUN COMPLETE | observations: {} | derived: {} ({} groups, {} duplicates) | batches: {} ok / {} failed",
        p.derive.rows_in,
        p.derive.rows_out,
        p.derive.groups,
        p.derive.duplicates_dropped,
        p.write.batches_ok,
        p.write.batches_failed,
    );
    info!(
        event = "TRAINING_SUMMARY",
        run_id = %ctx.run_id,
        "TRAINING | forecast: {} | skipped: {} | failed: {} | inserted: {} | already stored: {}",
        t.training.forecast,
        t.training.skipped,
        t.training.failed,
        t.persist.inserted,
        t.persist.skipped,
    );
}
