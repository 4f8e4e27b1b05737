//! HTTP client for the analytics backend

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

use super::wire::{self, ANOMALY_ENDPOINT, METRICS_ENDPOINT, NODE_DATA_ENDPOINT, PROJECTION_ENDPOINT};
use super::{anomaly_segments, node_data_segments, AnalyticsBackend, BackendError};
use crate::config::BackendConfig;
use crate::recompute::RecomputeKey;
use crate::types::{AnomalySnapshot, DrSnapshot, MetricCatalog, NodeTable};

/// reqwest-backed [`AnalyticsBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| BackendError::Url(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::Url(format!("{} cannot be a base URL", config.base_url)));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Base URL with `segments` appended, each percent-encoded as one path segment.
    pub fn url<I, S>(&self, segments: I) -> Result<Url, BackendError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Url(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, endpoint: &'static str, url: Url) -> Result<Vec<u8>, BackendError> {
        debug!(endpoint, url = %url, "GET");
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status { endpoint, status });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl AnalyticsBackend for HttpBackend {
    async fn fetch_metrics(&self) -> Result<MetricCatalog, BackendError> {
        let body = self.get(METRICS_ENDPOINT, self.url([METRICS_ENDPOINT])?).await?;
        wire::decode_metrics(&body)
    }

    async fn fetch_node_data(&self, dimensions: &[String]) -> Result<NodeTable, BackendError> {
        let url = self.url(node_data_segments(dimensions))?;
        let body = self.get(NODE_DATA_ENDPOINT, url).await?;
        wire::decode_node_data(&body, dimensions)
    }

    async fn fetch_projection(&self) -> Result<DrSnapshot, BackendError> {
        let body = self
            .get(PROJECTION_ENDPOINT, self.url([PROJECTION_ENDPOINT])?)
            .await?;
        wire::decode_projection(&body)
    }

    async fn fetch_anomalies(&self, key: &RecomputeKey) -> Result<AnomalySnapshot, BackendError> {
        let url = self.url(anomaly_segments(key)?)?;
        let body = self.get(ANOMALY_ENDPOINT, url).await?;
        wire::decode_anomalies(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            base_url: base.to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_url_joins_segments() {
        let b = backend("http://127.0.0.1:5010");
        let url = b.url(["nodeData", "Missed Buffers_P1,proc_run"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:5010/nodeData/Missed%20Buffers_P1,proc_run"
        );
    }

    #[test]
    fn test_url_keeps_base_path() {
        let b = backend("http://host/api/");
        assert_eq!(b.url(["mgrData"]).unwrap().as_str(), "http://host/api/mgrData");
    }

    #[test]
    fn test_rejects_non_base_url() {
        let err = HttpBackend::new(&BackendConfig {
            base_url: "mailto:ops@example.org".to_string(),
            timeout_secs: 5,
        })
        .unwrap_err();
        assert!(matches!(err, BackendError::Url(_)));
    }
}
