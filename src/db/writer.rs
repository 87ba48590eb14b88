use std::future::Future;

use tracing::{error, info};

use crate::db::models::PretreatmentRow;
use crate::error::Result;
use crate::types::DerivedRecord;

/// Destination of the derived series. One call is one batch; an
/// implementation must make a batch idempotent under its dedup key.
pub trait DerivedSink {
    fn upsert_batch(&self, batch: &[PretreatmentRow]) -> impl Future<Output = Result<()>> + Send;
}

/// Upserts into `stock_pretreatment`, one transaction per batch.
pub struct SqliteDerivedSink {
    pool: sqlx::SqlitePool,
}

impl SqliteDerivedSink {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl DerivedSink for SqliteDerivedSink {
    async fn upsert_batch(&self, batch: &[PretreatmentRow]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for row in batch {
            sqlx::query(
                r#"
                INSERT INTO stock_pretreatment (
                    site, seller_site_id, product_id, stock_status, prev_stock_status,
                    insert_time, update_time, stockout_time, restock_time
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(site, seller_site_id, product_id, insert_time) DO UPDATE SET
                    stock_status = excluded.stock_status,
                    prev_stock_status = excluded.prev_stock_status,
                    update_time = excluded.update_time,
                    stockout_time = excluded.stockout_time,
                    restock_time = excluded.restock_time
                "#,
            )
            .bind(&row.site)
            .bind(&row.seller_site_id)
            .bind(&row.product_id)
            .bind(row.stock_status)
            .bind(row.prev_stock_status)
            .bind(&row.insert_time)
            .bind(&row.update_time)
            .bind(&row.stockout_time)
            .bind(&row.restock_time)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub batches_ok: usize,
    pub batches_failed: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
}

/// Writes derived records in fixed-size batches. A failed batch is logged
/// with a sample of its payload and the remaining batches still run.
pub struct DerivedWriter<S> {
    sink: S,
    batch_size: usize,
}

impl<S: DerivedSink> DerivedWriter<S> {
    pub fn new(sink: S, batch_size: usize) -> Self {
        Self { sink, batch_size: batch_size.max(1) }
    }

    pub async fn write(&self, records: &[DerivedRecord]) -> WriteReport {
        let rows: Vec<PretreatmentRow> = records.iter().map(PretreatmentRow::from).collect();
        let total_batches = rows.len().div_ceil(self.batch_size);
        let mut report = WriteReport::default();

        info!(rows = rows.len(), batches = total_batches, "Writing derived series");

        for (i, batch) in rows.chunks(self.batch_size).enumerate() {
            let batch_no = i + 1;
            match self.sink.upsert_batch(batch).await {
                Ok(()) => {
                    report.batches_ok += 1;
                    report.rows_written += batch.len();
                    info!(batch = batch_no, rows = batch.len(), "Batch {batch_no}/{total_batches} upserted");
                }
                Err(e) => {
                    report.batches_failed += 1;
                    report.rows_failed += batch.len();
                    let sample = serde_json::to_string(&batch[0]).unwrap_or_default();
                    error!(
                        batch = batch_no,
                        rows = batch.len(),
                        sample = %sample,
                        "Batch {batch_no}/{total_batches} failed: {e}",
                    );
                }
            }
        }

        report
    }
}
