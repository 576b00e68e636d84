use indexmap::IndexMap;
use serde::Serialize;

use crate::providers::buildkite::State;

/// Running/scheduled counters for one slice of the organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountSnapshot {
    pub running_builds: u64,
    pub running_jobs: u64,
    pub scheduled_builds: u64,
    pub scheduled_jobs: u64,
}

impl CountSnapshot {
    pub fn add_build(&mut self, state: &State) {
        match state {
            State::Running => self.running_builds += 1,
            State::Scheduled => self.scheduled_builds += 1,
            _ => {}
        }
    }

    pub fn add_job(&mut self, state: &State) {
        match state {
            State::Running => self.running_jobs += 1,
            State::Scheduled => self.scheduled_jobs += 1,
            _ => {}
        }
    }
}

/// Label qualifying which subset of counts a metric describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dimension {
    Queue,
    Pipeline,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "Queue",
            Self::Pipeline => "Pipeline",
        }
    }
}

/// Counts for one collection cycle: organization totals plus per-queue and
/// per-pipeline breakdowns.
///
/// A build belongs to every queue its jobs ran on, so queue build counts can
/// add up to more than the total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    pub totals: CountSnapshot,
    pub queues: IndexMap<String, CountSnapshot>,
    pub pipelines: IndexMap<String, CountSnapshot>,
}

impl ResultSet {
    pub fn queue_mut(&mut self, name: &str) -> &mut CountSnapshot {
        self.queues.entry(name.to_owned()).or_default()
    }

    pub fn pipeline_mut(&mut self, name: &str) -> &mut CountSnapshot {
        self.pipelines.entry(name.to_owned()).or_default()
    }

    /// Every snapshot keyed by its optional dimension: totals first, then
    /// queues, then pipelines, each in insertion order.
    pub fn snapshots(&self) -> impl Iterator<Item = (Option<(Dimension, &str)>, &CountSnapshot)> {
        std::iter::once((None, &self.totals))
            .chain(
                self.queues
                    .iter()
                    .map(|(name, counts)| (Some((Dimension::Queue, name.as_str())), counts)),
            )
            .chain(
                self.pipelines
                    .iter()
                    .map(|(name, counts)| (Some((Dimension::Pipeline, name.as_str())), counts)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_and_scheduled_move_counters() {
        let mut counts = CountSnapshot::default();
        let states = [
            State::Running,
            State::Scheduled,
            State::Passed,
            State::Other("waiting_failed".into()),
        ];
        for state in &states {
            counts.add_build(state);
            counts.add_job(state);
        }
        assert_eq!(
            counts,
            CountSnapshot {
                running_builds: 1,
                running_jobs: 1,
                scheduled_builds: 1,
                scheduled_jobs: 1,
            }
        );
    }

    #[test]
    fn snapshots_lists_totals_then_queues_then_pipelines() {
        let mut result = ResultSet::default();
        result.pipeline_mut("web");
        result.queue_mut("deploy");
        result.queue_mut("default");

        let keys: Vec<_> = result.snapshots().map(|(key, _)| key).collect();
        assert_eq!(
            keys,
            vec![
                None,
                Some((Dimension::Queue, "deploy")),
                Some((Dimension::Queue, "default")),
                Some((Dimension::Pipeline, "web")),
            ]
        );
    }

    #[test]
    fn accessors_reuse_existing_keys() {
        let mut result = ResultSet::default();
        result.queue_mut("deploy").add_job(&State::Running);
        result.queue_mut("deploy").add_job(&State::Running);
        assert_eq!(result.queues.len(), 1);
        assert_eq!(result.queues["deploy"].running_jobs, 2);
    }
}
