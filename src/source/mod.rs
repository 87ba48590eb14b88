//! Observation store adapters. The deriver needs the whole log, so pages are
//! drained until the store returns an empty one.

pub mod rest;
pub mod sqlite;

use std::future::Future;

use tracing::{debug, info};

use crate::error::Result;
use crate::types::RawObservation;

pub use rest::RestObservationSource;
pub use sqlite::SqliteObservationSource;

/// A paginated, read-only view of the raw observation log.
pub trait ObservationSource {
    /// Fetch up to `limit` records starting at `offset`. An empty page means
    /// there is no more data.
    fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RawObservation>>> + Send;
}

/// Drain `source` page by page and return the full log in arrival order.
pub async fn fetch_all<S: ObservationSource>(source: &S, page_size: usize) -> Result<Vec<RawObservation>> {
    let page_size = page_size.max(1);
    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(offset, page_size).await?;
        if page.is_empty() {
            break;
        }
        pages += 1;
        offset += page.len();
        debug!(page = pages, rows = page.len(), "Fetched observation page");
        records.extend(page);
    }

    info!(rows = records.len(), pages, "Observation log fetched: {} rows in {pages} pages", records.len());
    Ok(records)
}
