use anyhow::{bail, Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::auth::Token;
use crate::collector::{Collector, CycleReport, Strategy};
use crate::config::{CollectionMode, Config, SinkBackend};
use crate::output::print_result_set;
use crate::providers::buildkite::{BuildkiteClient, RetryPolicy};
use crate::sinks::{CloudWatchSink, ConfiguredSink, DryRunSink, HttpSink};

#[derive(Parser)]
#[command(name = "buildkite-metrics")]
#[command(author, version, long_about = None)]
#[command(about = "Buildkite queue and pipeline metrics collector")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./buildkite-metrics.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect once, or repeatedly with --interval
    Run {
        #[arg(short, long, env = "BUILDKITE_API_ACCESS_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[arg(short, long, env = "BUILDKITE_ORG_SLUG")]
        org: Option<String>,

        /// Seconds between cycles
        #[arg(short, long)]
        interval: Option<u64>,

        #[arg(short, long, value_enum)]
        mode: Option<CollectionMode>,

        #[arg(short, long)]
        namespace: Option<String>,

        #[command(flatten)]
        sink: SinkArgs,
    },
    /// Collect once from a JSON event payload and print the counts
    Event {
        /// Payload file; read from stdin when omitted
        #[arg(long)]
        payload: Option<PathBuf>,

        #[command(flatten)]
        sink: SinkArgs,
    },
}

#[derive(clap::Args)]
struct SinkArgs {
    #[arg(long, value_enum)]
    sink: Option<SinkBackend>,

    #[arg(long)]
    sink_url: Option<String>,

    /// Log metrics instead of publishing them
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

/// Event-triggered invocation parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventPayload {
    #[serde(default)]
    buildkite_org_slug: String,
    #[serde(default)]
    buildkite_api_access_token: String,
}

impl EventPayload {
    fn parse(raw: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(raw).context("Failed to parse event payload")?;

        if payload.buildkite_org_slug.trim().is_empty() {
            bail!("No BuildkiteOrgSlug provided");
        }
        if payload.buildkite_api_access_token.trim().is_empty() {
            bail!("No BuildkiteApiAccessToken provided");
        }

        Ok(payload)
    }

    fn read(path: Option<&Path>) -> Result<Self> {
        let raw = match path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read payload: {}", path.display()))?,
            None => {
                let mut raw = String::new();
                std::io::stdin()
                    .read_to_string(&mut raw)
                    .context("Failed to read payload from stdin")?;
                raw
            }
        };
        Self::parse(&raw)
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Default)]
struct Overrides {
    token: Option<String>,
    org: Option<String>,
    interval: Option<u64>,
    mode: Option<CollectionMode>,
    namespace: Option<String>,
    sink: Option<SinkBackend>,
    sink_url: Option<String>,
    dry_run: bool,
}

impl Overrides {
    fn with_sink(self, sink: &SinkArgs) -> Self {
        Self {
            sink: sink.sink,
            sink_url: sink.sink_url.clone(),
            dry_run: sink.dry_run,
            ..self
        }
    }
}

/// A positive look-back that can still be subtracted from the current time.
fn look_back(name: &str, value: i64, span: fn(i64) -> Option<TimeDelta>) -> Result<TimeDelta> {
    if value <= 0 {
        bail!("{name} must be positive, got {value}");
    }
    span(value)
        .filter(|delta| Utc::now().checked_sub_signed(*delta).is_some())
        .with_context(|| format!("{name} is out of range: {value}"))
}

/// Fully resolved settings for one process.
#[derive(Debug)]
struct Settings {
    config: Config,
    token: Token,
    org: String,
    interval: Option<Duration>,
    initial_history: TimeDelta,
    history: TimeDelta,
    window: TimeDelta,
    sink_backend: SinkBackend,
    sink_url: Option<String>,
    dry_run: bool,
}

impl Settings {
    fn resolve(mut config: Config, overrides: Overrides) -> Result<Self> {
        let token = overrides
            .token
            .or_else(|| config.buildkite.token.take())
            .map(Token::from)
            .filter(|token| !token.is_empty())
            .context("Must provide a value for token")?;

        let org = overrides
            .org
            .or_else(|| config.buildkite.org.take())
            .filter(|org| !org.trim().is_empty())
            .context("Must provide a value for org")?;

        if let Some(mode) = overrides.mode {
            config.collector.mode = mode;
        }
        if let Some(namespace) = overrides.namespace {
            config.collector.namespace = namespace;
        }

        let collector = &config.collector;
        let initial_history = look_back(
            "initial-history-hours",
            collector.initial_history_hours,
            TimeDelta::try_hours,
        )?;
        let history = look_back("history-hours", collector.history_hours, TimeDelta::try_hours)?;
        let window = look_back("window-minutes", collector.window_minutes, TimeDelta::try_minutes)?;

        let interval = overrides
            .interval
            .or(collector.interval_seconds)
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs);
        let sink_url = overrides.sink_url.or_else(|| config.sink.url.clone());
        let sink_backend = overrides
            .sink
            .or(config.sink.backend)
            .unwrap_or(if sink_url.is_some() {
                SinkBackend::Http
            } else {
                SinkBackend::Cloudwatch
            });
        let dry_run = overrides.dry_run || config.sink.dry_run;

        Ok(Self {
            config,
            token,
            org,
            interval,
            initial_history,
            history,
            window,
            sink_backend,
            sink_url,
            dry_run,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.buildkite.timeout_seconds)
    }

    fn client(&self) -> Result<BuildkiteClient> {
        let buildkite = &self.config.buildkite;
        let client = BuildkiteClient::new(&buildkite.base_url, self.token.clone(), self.timeout())?
            .with_page_size(buildkite.per_page)
            .with_retry(RetryPolicy {
                max_retries: buildkite.max_retries,
                delay: Duration::from_secs(buildkite.retry_delay_seconds),
            });
        Ok(client)
    }

    async fn sink(&self) -> Result<ConfiguredSink> {
        if self.dry_run {
            return Ok(ConfiguredSink::DryRun(DryRunSink));
        }
        match self.sink_backend {
            SinkBackend::Cloudwatch => {
                let region = self.config.sink.region.clone();
                Ok(ConfiguredSink::CloudWatch(CloudWatchSink::from_env(region).await))
            }
            SinkBackend::Http => match &self.sink_url {
                Some(url) => Ok(ConfiguredSink::Http(HttpSink::new(url, self.timeout())?)),
                None => bail!("Must provide a sink URL for the http sink or enable dry-run"),
            },
        }
    }

    async fn collector(&self) -> Result<Collector<ConfiguredSink>> {
        Ok(Collector::new(
            self.client()?,
            self.sink().await?,
            self.org.clone(),
            self.config.collector.namespace.clone(),
        ))
    }

    /// Strategy for the cycle numbered `cycle`, starting at zero.
    fn strategy(&self, cycle: u64) -> Strategy {
        match self.config.collector.mode {
            CollectionMode::StateFiltered => Strategy::StateFiltered {
                history: if cycle == 0 {
                    self.initial_history
                } else {
                    self.history
                },
            },
            CollectionMode::TimeWindowed => self.window_strategy(),
        }
    }

    fn window_strategy(&self) -> Strategy {
        Strategy::TimeWindowed {
            window: self.window,
        }
    }
}

fn log_report(collector: &Collector<ConfiguredSink>, org: &str, report: &CycleReport) {
    info!(
        "Cycle complete: {} builds, {} metrics in {} chunk(s)",
        report.builds, report.data_points, report.chunks
    );
    if collector.sink().is_dry_run() {
        print_result_set(org, &report.result);
    }
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        Config::load(self.config.as_deref()).context("Failed to load configuration")
    }

    fn to_json<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }

    /// The first cycle must succeed, so a bad token or org stops the process
    /// at startup. Later cycles log their failure and wait for the next tick.
    async fn execute_run(&self, overrides: Overrides) -> Result<()> {
        let settings = Settings::resolve(self.load_config()?, overrides)?;
        let collector = settings.collector().await?;

        let first = collector
            .run_cycle(settings.strategy(0), Utc::now())
            .await
            .context("Collection cycle failed")?;
        log_report(&collector, &settings.org, &first);

        let Some(period) = settings.interval else {
            return Ok(());
        };

        info!("Collecting every {}s", period.as_secs());
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycle = 1u64;
        loop {
            ticker.tick().await;
            match collector.run_cycle(settings.strategy(cycle), Utc::now()).await {
                Ok(report) => log_report(&collector, &settings.org, &report),
                Err(e) if e.is_retrieval() => error!("Failed to retrieve builds: {e}"),
                Err(e) => error!("Collection cycle failed: {e}"),
            }
            cycle += 1;
        }
    }

    async fn execute_event(&self, payload: Option<&Path>, sink: &SinkArgs) -> Result<()> {
        let payload = EventPayload::read(payload)?;
        let overrides = Overrides {
            token: Some(payload.buildkite_api_access_token),
            org: Some(payload.buildkite_org_slug),
            ..Overrides::default()
        }
        .with_sink(sink);
        let settings = Settings::resolve(self.load_config()?, overrides)?;
        let collector = settings.collector().await?;

        let report = collector
            .run_cycle(settings.window_strategy(), Utc::now())
            .await
            .context("Collection cycle failed")?;
        log_report(&collector, &settings.org, &report);

        println!("{}", self.to_json(&report.result)?);
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Run {
                token,
                org,
                interval,
                mode,
                namespace,
                sink,
            } => {
                let overrides = Overrides {
                    token: token.clone(),
                    org: org.clone(),
                    interval: *interval,
                    mode: *mode,
                    namespace: namespace.clone(),
                    ..Overrides::default()
                };
                self.execute_run(overrides.with_sink(sink)).await
            }
            Commands::Event { payload, sink } => {
                self.execute_event(payload.as_deref(), sink).await
            }
        }
    }
}
