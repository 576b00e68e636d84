use chrono::{DateTime, TimeDelta, Utc};
use log::info;
use serde::Serialize;

use crate::error::{MetricsError, Result};
use crate::metrics::{
    chunk_metric_data, extract_metrics, Aggregator, Inclusion, ResultSet, MAX_DATUMS_PER_CALL,
};
use crate::providers::buildkite::{BuildkiteClient, BuildsQuery, State};
use crate::sinks::MetricsSink;

/// How a cycle decides which builds to query and count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Seed pipeline and queue keys from builds finished within `history`,
    /// then count the builds currently scheduled and running.
    StateFiltered { history: TimeDelta },
    /// Query builds created within `window` and count those active inside it.
    TimeWindowed { window: TimeDelta },
}

impl Strategy {
    /// Earliest instant the upstream query looks back to from `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let span = match self {
            Self::StateFiltered { history } => history,
            Self::TimeWindowed { window } => window,
        };
        now.checked_sub_signed(*span).ok_or_else(|| {
            MetricsError::Config(format!("Look-back of {span} before {now} is out of range"))
        })
    }

    pub fn inclusion(&self, now: DateTime<Utc>) -> Result<Inclusion> {
        Ok(match self {
            Self::StateFiltered { .. } => Inclusion::Unconditional,
            Self::TimeWindowed { .. } => Inclusion::After(self.cutoff(now)?),
        })
    }
}

/// Outcome of a completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub builds: usize,
    pub data_points: usize,
    pub chunks: usize,
    pub result: ResultSet,
}

/// Runs retrieval, aggregation, extraction and submission for one
/// organization.
pub struct Collector<S> {
    client: BuildkiteClient,
    sink: S,
    org: String,
    namespace: String,
}

impl<S: MetricsSink> Collector<S> {
    pub fn new(client: BuildkiteClient, sink: S, org: String, namespace: String) -> Self {
        Self {
            client,
            sink,
            org,
            namespace,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs one full cycle.
    ///
    /// # Errors
    ///
    /// Any retrieval error aborts the cycle before anything is submitted. A
    /// rejected chunk aborts the remaining chunks; chunks already accepted
    /// stay published.
    pub async fn run_cycle(&self, strategy: Strategy, now: DateTime<Utc>) -> Result<CycleReport> {
        info!("Collecting buildkite metrics from org {}", self.org);
        let (result, builds) = self.collect(strategy, now).await?;

        info!("Extracting metrics from results");
        let metrics = extract_metrics(&result);
        let chunks = chunk_metric_data(MAX_DATUMS_PER_CALL, &metrics);

        for chunk in &chunks {
            info!(
                "Submitting chunk of {} metrics to {}",
                chunk.len(),
                self.namespace
            );
            self.sink.put_metric_data(&self.namespace, chunk).await?;
        }

        Ok(CycleReport {
            builds,
            data_points: metrics.len(),
            chunks: chunks.len(),
            result,
        })
    }

    /// Retrieves and aggregates builds without submitting anything.
    pub async fn collect(
        &self,
        strategy: Strategy,
        now: DateTime<Utc>,
    ) -> Result<(ResultSet, usize)> {
        let aggregator = Aggregator::new(strategy.inclusion(now)?);
        let cutoff = strategy.cutoff(now)?;

        match strategy {
            Strategy::StateFiltered { .. } => {
                let mut result = ResultSet::default();
                let mut counted = 0;

                let finished = self
                    .client
                    .fetch_builds(&self.org, &BuildsQuery::finished_since(cutoff))
                    .await?;
                Aggregator::seed(&mut result, &finished);

                for state in [State::Scheduled, State::Running] {
                    let builds = self
                        .client
                        .fetch_builds(&self.org, &BuildsQuery::in_state(state))
                        .await?;
                    aggregator.add_builds(&mut result, &builds);
                    counted += builds.len();
                }
                Ok((result, counted))
            }
            Strategy::TimeWindowed { .. } => {
                let builds = self
                    .client
                    .fetch_builds(&self.org, &BuildsQuery::created_since(cutoff))
                    .await?;
                info!("Aggregating results from {} builds", builds.len());
                Ok((aggregator.aggregate(&builds), builds.len()))
            }
        }
    }
}
