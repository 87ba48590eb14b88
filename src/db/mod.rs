pub mod forecasts;
pub mod models;
pub mod series;
pub mod writer;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::Result;

/// Open the store and bring its schema up to date. In-memory databases are
/// pinned to a single connection so every query sees the same schema.
pub async fn connect(url: &str) -> Result<sqlx::SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    let mut pool_opts = SqlitePoolOptions::new();
    if url.contains(":memory:") {
        pool_opts = pool_opts
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = pool_opts.connect_with(opts).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
