use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use log::debug;

use super::counts::ResultSet;
use crate::providers::buildkite::{Activity, Build};

/// Decides whether a fetched build or job moves any counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    /// Everything counts; the upstream query already filtered by state.
    Unconditional,
    /// Only records whose reference time (finish, start, schedule, then
    /// creation) is strictly after the cutoff count.
    After(DateTime<Utc>),
}

impl Inclusion {
    pub fn includes(&self, record: &impl Activity) -> bool {
        match self {
            Self::Unconditional => true,
            Self::After(cutoff) => record.reference_time().is_some_and(|at| at > *cutoff),
        }
    }
}

/// Folds builds and their jobs into a [`ResultSet`].
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    inclusion: Inclusion,
}

impl Aggregator {
    pub fn new(inclusion: Inclusion) -> Self {
        Self { inclusion }
    }

    /// Registers zero-valued pipeline and queue keys for `builds` without
    /// counting anything, so idle pipelines and queues still report zeroes.
    pub fn seed(result: &mut ResultSet, builds: &[Build]) {
        for build in builds {
            result.pipeline_mut(&build.pipeline.name);
            for job in &build.jobs {
                result.queue_mut(job.queue());
            }
        }
    }

    /// Counts `builds` into a fresh result set.
    pub fn aggregate(&self, builds: &[Build]) -> ResultSet {
        let mut result = ResultSet::default();
        self.add_builds(&mut result, builds);
        result
    }

    /// Counts `builds` into `result`.
    ///
    /// A build's state increments the totals and its pipeline once, and every
    /// distinct queue its counted jobs ran on. Each counted job increments the
    /// totals, its build's pipeline and its own queue.
    pub fn add_builds(&self, result: &mut ResultSet, builds: &[Build]) {
        for build in builds {
            self.add_build(result, build);
        }
    }

    fn add_build(&self, result: &mut ResultSet, build: &Build) {
        let pipeline = build.pipeline.name.as_str();
        let build_counted = self.inclusion.includes(build);

        debug!(
            "Adding build to stats (id={:?}, pipeline={pipeline:?}, branch={:?}, state={:?}, counted={build_counted})",
            build.id, build.branch, build.state.as_str()
        );

        let pipeline_counts = result.pipeline_mut(pipeline);
        if build_counted {
            pipeline_counts.add_build(&build.state);
            result.totals.add_build(&build.state);
        }

        let mut build_queues: IndexSet<&str> = IndexSet::new();

        for job in &build.jobs {
            let queue = job.queue();
            result.queue_mut(queue);

            if !self.inclusion.includes(job) {
                continue;
            }

            debug!(
                "Adding job to stats (id={:?}, pipeline={pipeline:?}, queue={queue:?}, type={:?}, state={:?})",
                job.id,
                job.kind.as_deref().unwrap_or(""),
                job.state.as_str()
            );

            result.totals.add_job(&job.state);
            result.pipeline_mut(pipeline).add_job(&job.state);
            result.queue_mut(queue).add_job(&job.state);
            build_queues.insert(queue);
        }

        if build_counted {
            for queue in build_queues {
                result.queue_mut(queue).add_build(&build.state);
            }
        }
    }
}
