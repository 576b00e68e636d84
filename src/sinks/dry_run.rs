use log::info;

use super::MetricsSink;
use crate::error::Result;
use crate::metrics::DataPoint;

/// Dry-run sink: logs every data point instead of publishing it.
#[derive(Debug, Default)]
pub struct DryRunSink;

impl MetricsSink for DryRunSink {
    async fn put_metric_data(&self, namespace: &str, data: &[DataPoint]) -> Result<()> {
        for point in data {
            let dimensions = point
                .dimensions
                .iter()
                .map(|d| format!("{}={}", d.name.as_str(), d.value))
                .collect::<Vec<_>>()
                .join(",");
            info!(
                "[dry-run] {namespace} > {} [{dimensions}] = {}",
                point.metric_name, point.value
            );
        }
        Ok(())
    }
}
