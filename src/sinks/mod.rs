mod cloudwatch;
mod dry_run;
mod http;

pub use cloudwatch::CloudWatchSink;
pub use dry_run::DryRunSink;
pub use http::HttpSink;

use crate::error::Result;
use crate::metrics::DataPoint;

/// Destination for extracted metrics.
///
/// Callers never pass more than [`crate::metrics::MAX_DATUMS_PER_CALL`]
/// points at once. An error means the whole chunk was rejected.
#[allow(async_fn_in_trait)]
pub trait MetricsSink {
    async fn put_metric_data(&self, namespace: &str, data: &[DataPoint]) -> Result<()>;
}

/// Sink chosen at startup from configuration.
pub enum ConfiguredSink {
    CloudWatch(CloudWatchSink),
    Http(HttpSink),
    DryRun(DryRunSink),
}

impl ConfiguredSink {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun(_))
    }
}

impl MetricsSink for ConfiguredSink {
    async fn put_metric_data(&self, namespace: &str, data: &[DataPoint]) -> Result<()> {
        match self {
            Self::CloudWatch(sink) => sink.put_metric_data(namespace, data).await,
            Self::Http(sink) => sink.put_metric_data(namespace, data).await,
            Self::DryRun(sink) => sink.put_metric_data(namespace, data).await,
        }
    }
}
