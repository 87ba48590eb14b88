use serde_json::Value;
use sqlx::Row;

use crate::error::Result;
use crate::source::ObservationSource;
use crate::types::RawObservation;

/// Reads the `observations` table of the local store, paged by rowid.
/// Every column comes back as text so coercion stays in the deriver.
pub struct SqliteObservationSource {
    pool: sqlx::SqlitePool,
}

impl SqliteObservationSource {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl ObservationSource for SqliteObservationSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<RawObservation>> {
        let rows = sqlx::query(
            r#"
            SELECT site, seller_site_id, product_id,
                   CAST(stock_status AS TEXT) AS stock_status,
                   insert_time, update_time
            FROM observations
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut page = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = RawObservation::new();
            for column in ["site", "seller_site_id", "product_id", "stock_status", "insert_time", "update_time"] {
                let value: Option<String> = row.try_get(column)?;
                record.insert(column.to_string(), value.map(Value::String).unwrap_or(Value::Null));
            }
            page.push(record);
        }
        Ok(page)
    }
}

/// Append one raw observation. Used by acquisition jobs and tests.
pub async fn insert_observation(
    pool: &sqlx::SqlitePool,
    site: &str,
    seller_site_id: &str,
    product_id: &str,
    stock_status: Option<&str>,
    insert_time: Option<&str>,
    update_time: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO observations (site, seller_site_id, product_id, stock_status, insert_time, update_time)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(site)
    .bind(seller_site_id)
    .bind(product_id)
    .bind(stock_status)
    .bind(insert_time)
    .bind(update_time)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;
    use crate::source::fetch_all;

    #[tokio::test]
    async fn pages_preserve_arrival_order_and_nulls() {
        let pool = connect("sqlite::memory:").await.unwrap();
        for i in 0..5 {
            let ts = format!("2025-03-0{}T00:00:00", i + 1);
            insert_observation(&pool, "yahoo", "s1", "P1", Some("1"), Some(&ts), Some(&ts))
                .await
                .unwrap();
        }
        insert_observation(&pool, "yahoo", "s1", "P1", None, None, Some("bad")).await.unwrap();

        let source = SqliteObservationSource::new(pool);
        let rows = fetch_all(&source, 2).await.unwrap();

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0]["insert_time"], "2025-03-01T00:00:00");
        assert_eq!(rows[4]["insert_time"], "2025-03-05T00:00:00");
        assert!(rows[5]["stock_status"].is_null());
        assert!(rows[5]["insert_time"].is_null());
        assert_eq!(rows[5]["update_time"], "bad");
    }
}
