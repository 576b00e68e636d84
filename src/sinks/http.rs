use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use url::Url;

use super::MetricsSink;
use crate::error::{MetricsError, Result};
use crate::metrics::DataPoint;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutMetricDataRequest<'a> {
    namespace: &'a str,
    metric_data: &'a [DataPoint],
}

/// Posts each chunk as a `PutMetricData`-shaped JSON document to a metrics
/// gateway.
pub struct HttpSink {
    client: Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| MetricsError::Config(format!("Invalid sink URL: {e}")))?;

        let client = Client::builder()
            .user_agent(concat!("buildkite-metrics/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| MetricsError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }
}

impl MetricsSink for HttpSink {
    async fn put_metric_data(&self, namespace: &str, data: &[DataPoint]) -> Result<()> {
        let rejected = |message: String| MetricsError::Submission {
            namespace: namespace.to_string(),
            count: data.len(),
            message,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&PutMetricDataRequest {
                namespace,
                metric_data: data,
            })
            .send()
            .await
            .map_err(|e| rejected(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(rejected(format!("status {status}: {body}")));
        }

        Ok(())
    }
}
