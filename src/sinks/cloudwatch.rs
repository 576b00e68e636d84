use aws_config::BehaviorVersion;
use aws_sdk_cloudwatch::config::Region;
use aws_sdk_cloudwatch::error::{BuildError, DisplayErrorContext};
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};
use aws_sdk_cloudwatch::Client;
use log::debug;

use super::MetricsSink;
use crate::error::{MetricsError, Result};
use crate::metrics::DataPoint;

/// Publishes each chunk with one CloudWatch `PutMetricData` call.
pub struct CloudWatchSink {
    client: Client,
}

impl CloudWatchSink {
    /// Builds a client from the standard AWS credential chain. `region`
    /// overrides the region from the environment or profile.
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        Self {
            client: Client::new(&config),
        }
    }
}

fn to_datum(point: &DataPoint) -> std::result::Result<MetricDatum, BuildError> {
    let dimensions = point
        .dimensions
        .iter()
        .map(|d| {
            Dimension::builder()
                .name(d.name.as_str())
                .value(&d.value)
                .build()
        })
        .collect::<Vec<_>>();

    Ok(MetricDatum::builder()
        .metric_name(point.metric_name.as_str())
        .set_dimensions((!dimensions.is_empty()).then_some(dimensions))
        .value(point.value)
        .unit(StandardUnit::Count)
        .build())
}

impl MetricsSink for CloudWatchSink {
    async fn put_metric_data(&self, namespace: &str, data: &[DataPoint]) -> Result<()> {
        let rejected = |message: String| MetricsError::Submission {
            namespace: namespace.to_string(),
            count: data.len(),
            message,
        };

        let datums = data
            .iter()
            .map(to_datum)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| rejected(e.to_string()))?;

        self.client
            .put_metric_data()
            .namespace(namespace)
            .set_metric_data(Some(datums))
            .send()
            .await
            .map_err(|e| rejected(DisplayErrorContext(&e).to_string()))?;

        debug!("CloudWatch accepted {} metrics in {namespace}", data.len());
        Ok(())
    }
}
