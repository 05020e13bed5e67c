use anyhow::{Context, Result};
use std::time::Duration;

use crate::error::AppError;
use crate::model::candle::Candle;

use super::types::{BackendErrorResponse, HistoryCandle};

pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HistoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn candles_url(&self) -> String {
        candles_url(&self.base_url)
    }

    /// `GET {base}/candles?symbol=&interval=&limit=`
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<HistoryCandle>> {
        let url = self.candles_url();
        tracing::debug!(%url, symbol, interval, limit, "Fetching candle history");

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", interval.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .context("fetch_candles HTTP failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body = serde_json::from_str::<BackendErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(AppError::BackendApi {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let rows: Vec<HistoryCandle> = resp
            .json()
            .await
            .context("failed to decode candle history")?;
        Ok(rows)
    }

    /// Fetch and convert in one go; the aggregator realigns buckets.
    pub async fn fetch_series(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let rows = self.fetch_candles(symbol, interval, limit).await?;
        Ok(rows.into_iter().map(|r| r.into_candle(now_ms)).collect())
    }
}

pub fn candles_url(base_url: &str) -> String {
    format!("{}/candles", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candles_url_strips_trailing_slash() {
        assert_eq!(
            candles_url("http://localhost:3001/"),
            "http://localhost:3001/candles"
        );
        assert_eq!(candles_url("http://h/api"), "http://h/api/candles");
    }
}
