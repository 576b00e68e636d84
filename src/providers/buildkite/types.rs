use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Queue used when a job's agent rules don't target one explicitly.
pub const DEFAULT_QUEUE: &str = "default";

static QUEUE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^queue=(.+?)$").expect("queue pattern is valid"));

/// Lifecycle state shared by builds and jobs.
///
/// Only `Running` and `Scheduled` move counters. Anything Buildkite reports
/// that isn't listed here is kept verbatim in `Other` so it still shows up
/// in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum State {
    Creating,
    Pending,
    Waiting,
    Blocked,
    Scheduled,
    Assigned,
    Accepted,
    Running,
    Passed,
    Failing,
    Failed,
    Canceling,
    Canceled,
    TimingOut,
    TimedOut,
    Skipped,
    NotRun,
    Finished,
    Broken,
    Expired,
    Other(String),
}

impl State {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Pending => "pending",
            Self::Waiting => "waiting",
            Self::Blocked => "blocked",
            Self::Scheduled => "scheduled",
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failing => "failing",
            Self::Failed => "failed",
            Self::Canceling => "canceling",
            Self::Canceled => "canceled",
            Self::TimingOut => "timing_out",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
            Self::NotRun => "not_run",
            Self::Finished => "finished",
            Self::Broken => "broken",
            Self::Expired => "expired",
            Self::Other(raw) => raw,
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<&str> for State {
    fn from(raw: &str) -> Self {
        match raw {
            "creating" => Self::Creating,
            "pending" => Self::Pending,
            "waiting" => Self::Waiting,
            "blocked" => Self::Blocked,
            "scheduled" => Self::Scheduled,
            "assigned" => Self::Assigned,
            "accepted" => Self::Accepted,
            "running" => Self::Running,
            "passed" => Self::Passed,
            "failing" => Self::Failing,
            "failed" => Self::Failed,
            "canceling" => Self::Canceling,
            "canceled" => Self::Canceled,
            "timing_out" => Self::TimingOut,
            "timed_out" => Self::TimedOut,
            "skipped" => Self::Skipped,
            "not_run" => Self::NotRun,
            "finished" => Self::Finished,
            "broken" => Self::Broken,
            "expired" => Self::Expired,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// `null` (e.g. waiter jobs) decodes like a missing state.
impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .map_or_else(Self::default, |raw| Self::from(raw.as_str())))
    }
}

/// Timestamps consulted by time-windowed counting.
pub trait Activity {
    fn finished_at(&self) -> Option<DateTime<Utc>>;
    fn started_at(&self) -> Option<DateTime<Utc>>;
    fn scheduled_at(&self) -> Option<DateTime<Utc>>;
    fn created_at(&self) -> Option<DateTime<Utc>>;

    /// The most advanced lifecycle timestamp that is set: finish, then start,
    /// then schedule, then creation.
    fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.finished_at()
            .or_else(|| self.started_at())
            .or_else(|| self.scheduled_at())
            .or_else(|| self.created_at())
    }
}

/// The pipeline a build belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

/// A single Buildkite pipeline execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Build {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// One step of a build, run by an agent on some queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub agent_query_rules: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Queue targeted by the first `queue=<name>` agent rule, or `"default"`.
    pub fn queue(&self) -> &str {
        self.agent_query_rules
            .iter()
            .flatten()
            .find_map(|rule| QUEUE_PATTERN.captures(rule))
            .and_then(|caps| caps.get(1))
            .map_or(DEFAULT_QUEUE, |m| m.as_str())
    }
}

impl Activity for Build {
    fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
    fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
    fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

impl Activity for Job {
    fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
    fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
    fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job_with_rules(rules: &[&str]) -> Job {
        Job {
            agent_query_rules: Some(rules.iter().map(ToString::to_string).collect()),
            ..Job::default()
        }
    }

    mod queue {
        use super::*;

        #[test]
        fn uses_queue_rule_value() {
            assert_eq!(job_with_rules(&["queue=deploy"]).queue(), "deploy");
        }

        #[test]
        fn falls_back_to_default_without_queue_rule() {
            assert_eq!(job_with_rules(&["os=linux"]).queue(), "default");
            assert_eq!(Job::default().queue(), "default");
        }

        #[test]
        fn matches_case_insensitively() {
            assert_eq!(job_with_rules(&["QUEUE=x"]).queue(), "x");
        }

        #[test]
        fn first_matching_rule_wins() {
            let job = job_with_rules(&["os=linux", "queue=first", "queue=second"]);
            assert_eq!(job.queue(), "first");
        }

        #[test]
        fn requires_rule_to_start_with_queue() {
            assert_eq!(job_with_rules(&["myqueue=x"]).queue(), "default");
            assert_eq!(job_with_rules(&["queue="]).queue(), "default");
        }

        #[test]
        fn is_deterministic() {
            let job = job_with_rules(&["arch=arm64", "queue=builders"]);
            assert_eq!(job.queue(), job.queue());
        }
    }

    mod decoding {
        use super::*;

        #[test]
        fn decodes_build_with_jobs() {
            let json = r#"{
                "id": "b-1",
                "number": 42,
                "branch": "main",
                "state": "running",
                "pipeline": {"id": "p-1", "name": "Web", "slug": "web"},
                "created_at": "2026-10-19T10:00:00.000Z",
                "scheduled_at": "2026-10-19T10:00:01.000Z",
                "started_at": "2026-10-19T10:00:05.000Z",
                "finished_at": null,
                "jobs": [
                    {"id": "j-1", "type": "script", "state": "scheduled",
                     "agent_query_rules": ["queue=deploy"]},
                    {"id": "j-2", "type": "waiter"}
                ]
            }"#;

            let build: Build = serde_json::from_str(json).unwrap();
            assert_eq!(build.state, State::Running);
            assert_eq!(build.pipeline.name, "Web");
            assert!(build.finished_at.is_none());
            assert_eq!(build.jobs.len(), 2);
            assert_eq!(build.jobs[0].queue(), "deploy");
            assert_eq!(build.jobs[1].state, State::default());
        }

        #[test]
        fn unknown_states_keep_the_reported_name() {
            let build: Build = serde_json::from_str(r#"{"state": "waiting_failed"}"#).unwrap();
            assert_eq!(build.state, State::Other("waiting_failed".into()));
            assert_eq!(build.state.as_str(), "waiting_failed");
        }

        #[test]
        fn null_and_missing_states_decode_as_empty_other() {
            let job: Job = serde_json::from_str(r#"{"state": null}"#).unwrap();
            assert_eq!(job.state, State::default());

            let job: Job = serde_json::from_str("{}").unwrap();
            assert_eq!(job.state.as_str(), "");
        }

        #[test]
        fn known_states_serialize_to_their_wire_name() {
            assert_eq!(State::from("timed_out"), State::TimedOut);
            assert_eq!(serde_json::to_string(&State::NotRun).unwrap(), r#""not_run""#);
            assert_eq!(
                serde_json::to_string(&State::Other("limited".into())).unwrap(),
                r#""limited""#
            );
        }

        #[test]
        fn null_agent_rules_use_default_queue() {
            let job: Job = serde_json::from_str(r#"{"agent_query_rules": null}"#).unwrap();
            assert_eq!(job.queue(), "default");
        }
    }

    mod reference_time {
        use super::*;

        #[test]
        fn prefers_finish_over_earlier_timestamps() {
            let created = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
            let finished = Utc.with_ymd_and_hms(2026, 10, 19, 11, 0, 0).unwrap();
            let build = Build {
                created_at: Some(created),
                finished_at: Some(finished),
                ..Build::default()
            };
            assert_eq!(build.reference_time(), Some(finished));
        }

        #[test]
        fn falls_back_through_start_schedule_and_creation() {
            let scheduled = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
            let job = Job {
                scheduled_at: Some(scheduled),
                created_at: Some(scheduled - chrono::TimeDelta::minutes(1)),
                ..Job::default()
            };
            assert_eq!(job.reference_time(), Some(scheduled));
            assert_eq!(Job::default().reference_time(), None);
        }
    }
}
