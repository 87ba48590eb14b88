use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::source::ObservationSource;
use crate::types::RawObservation;

/// Reads a PostgREST-style table endpoint (`/rest/v1/{table}`), which is how
/// hosted stores expose the observation log.
pub struct RestObservationSource {
    client: reqwest::Client,
    base_url: String,
    table: String,
    api_key: String,
}

impl RestObservationSource {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.rest_base_url.trim_end_matches('/').to_string(),
            table: cfg.rest_table.clone(),
            api_key: cfg.rest_api_key.clone(),
        })
    }

    fn page_url(&self, offset: usize, limit: usize) -> String {
        format!(
            "{}/rest/v1/{}?select=*&order=id.asc&offset={offset}&limit={limit}",
            self.base_url, self.table
        )
    }
}

impl ObservationSource for RestObservationSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<RawObservation>> {
        let url = self.page_url(offset, limit);
        let resp = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = resp.json().await?;
        let items = match body {
            serde_json::Value::Array(items) => items,
            _ => {
                return Err(AppError::Source(format!(
                    "{} page at offset {offset} was not an array",
                    self.table
                )))
            }
        };

        items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::Object(map) => Ok(map),
                other => Err(AppError::Source(format!("expected an object row, got {other}"))),
            })
            .collect()
    }
}
