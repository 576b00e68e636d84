use std::fmt;

use serde::Serialize;

use super::counts::{CountSnapshot, Dimension, ResultSet};

/// Names of the published metrics. These are part of the dashboard contract
/// and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MetricName {
    RunningBuildsCount,
    RunningJobsCount,
    ScheduledBuildsCount,
    ScheduledJobsCount,
}

impl MetricName {
    pub const ALL: [Self; 4] = [
        Self::RunningBuildsCount,
        Self::RunningJobsCount,
        Self::ScheduledBuildsCount,
        Self::ScheduledJobsCount,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunningBuildsCount => "RunningBuildsCount",
            Self::RunningJobsCount => "RunningJobsCount",
            Self::ScheduledBuildsCount => "ScheduledBuildsCount",
            Self::ScheduledJobsCount => "ScheduledJobsCount",
        }
    }

    pub fn read(self, counts: &CountSnapshot) -> u64 {
        match self {
            Self::RunningBuildsCount => counts.running_builds,
            Self::RunningJobsCount => counts.running_jobs,
            Self::ScheduledBuildsCount => counts.scheduled_builds,
            Self::ScheduledJobsCount => counts.scheduled_jobs,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DimensionValue {
    pub name: Dimension,
    pub value: String,
}

/// A single named, dimensioned measurement ready for the sink.
///
/// Serializes in `PutMetricData` shape (`MetricName`, `Dimensions`, `Value`,
/// `Unit`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataPoint {
    pub metric_name: MetricName,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<DimensionValue>,
    pub value: f64,
    pub unit: Unit,
}

impl DataPoint {
    #[cfg(test)]
    pub fn dimension(&self, name: Dimension) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}

/// Flattens a result set into four data points per snapshot: totals without
/// dimensions, then one `Queue` group per queue, then one `Pipeline` group
/// per pipeline.
pub fn extract_metrics(result: &ResultSet) -> Vec<DataPoint> {
    result
        .snapshots()
        .flat_map(|(key, counts)| snapshot_metrics(key, counts))
        .collect()
}

fn snapshot_metrics<'a>(
    key: Option<(Dimension, &str)>,
    counts: &'a CountSnapshot,
) -> impl Iterator<Item = DataPoint> + 'a {
    let dimensions: Vec<DimensionValue> = key
        .map(|(name, value)| DimensionValue {
            name,
            value: value.to_string(),
        })
        .into_iter()
        .collect();

    MetricName::ALL.into_iter().map(move |metric_name| {
        #[allow(clippy::cast_precision_loss)]
        let value = metric_name.read(counts) as f64;
        DataPoint {
            metric_name,
            dimensions: dimensions.clone(),
            value,
            unit: Unit::Count,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::buildkite::State;

    fn result_with(queues: &[&str], pipelines: &[&str]) -> ResultSet {
        let mut result = ResultSet::default();
        for queue in queues {
            result.queue_mut(queue);
        }
        for pipeline in pipelines {
            result.pipeline_mut(pipeline);
        }
        result
    }

    #[test]
    fn emits_four_points_per_snapshot() {
        let result = result_with(&["default", "deploy"], &["web", "api", "docs"]);
        let points = extract_metrics(&result);
        assert_eq!(points.len(), 4 + 2 * 4 + 3 * 4);
    }

    #[test]
    fn empty_result_still_reports_totals() {
        let points = extract_metrics(&ResultSet::default());
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| p.dimensions.is_empty() && p.value == 0.0));
    }

    #[test]
    fn points_carry_their_own_snapshot_values() {
        let mut result = result_with(&["deploy"], &["web"]);
        result.totals.add_build(&State::Running);
        result.totals.add_build(&State::Running);
        result.queue_mut("deploy").add_job(&State::Scheduled);
        result.pipeline_mut("web").add_build(&State::Running);

        let points = extract_metrics(&result);

        let find = |dimension: Option<(Dimension, &str)>, metric: MetricName| {
            points
                .iter()
                .find(|p| {
                    p.metric_name == metric
                        && match dimension {
                            None => p.dimensions.is_empty(),
                            Some((name, value)) => p.dimension(name) == Some(value),
                        }
                })
                .map(|p| p.value)
        };

        assert_eq!(find(None, MetricName::RunningBuildsCount), Some(2.0));
        assert_eq!(
            find(Some((Dimension::Queue, "deploy")), MetricName::ScheduledJobsCount),
            Some(1.0)
        );
        assert_eq!(
            find(Some((Dimension::Queue, "deploy")), MetricName::RunningBuildsCount),
            Some(0.0)
        );
        assert_eq!(
            find(Some((Dimension::Pipeline, "web")), MetricName::RunningBuildsCount),
            Some(1.0)
        );
    }

    #[test]
    fn never_mixes_queue_and_pipeline_dimensions() {
        let points = extract_metrics(&result_with(&["a"], &["p"]));
        assert!(points.iter().all(|p| p.dimensions.len() <= 1));
        assert_eq!(points[4].dimension(Dimension::Queue), Some("a"));
        assert_eq!(points[8].dimension(Dimension::Pipeline), Some("p"));
    }

    #[test]
    fn serializes_in_put_metric_data_shape() {
        let result = result_with(&["deploy"], &[]);
        let points = extract_metrics(&result);
        let json = serde_json::to_value(&points[4]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "MetricName": "RunningBuildsCount",
                "Dimensions": [{"Name": "Queue", "Value": "deploy"}],
                "Value": 0.0,
                "Unit": "Count"
            })
        );

        let global = serde_json::to_value(&points[0]).unwrap();
        assert!(global.get("Dimensions").is_none());
    }
}
