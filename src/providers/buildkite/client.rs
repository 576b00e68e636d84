use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::header::LINK;
use reqwest::{Client, StatusCode};
use url::Url;

use super::links;
use super::types::{Build, State};
use crate::auth::Token;
use crate::error::{MetricsError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.buildkite.com/v2/";
pub const PAGE_SIZE: usize = 100;

const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Filters for the organization builds endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildsQuery {
    pub state: Option<State>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub finished_from: Option<DateTime<Utc>>,
}

impl BuildsQuery {
    pub fn in_state(state: State) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn created_since(from: DateTime<Utc>) -> Self {
        Self {
            created_from: Some(from),
            ..Self::default()
        }
    }

    pub fn finished_since(from: DateTime<Utc>) -> Self {
        Self {
            finished_from: Some(from),
            ..Self::default()
        }
    }
}

/// Bounded retry for transient upstream failures. Disabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::from_secs(5),
        }
    }
}

/// One decoded page of builds plus the continuation URL, if any.
#[derive(Debug)]
pub struct Page {
    pub builds: Vec<Build>,
    pub next: Option<Url>,
}

pub struct BuildkiteClient {
    client: Client,
    api_url: Url,
    token: Token,
    per_page: usize,
    retry: RetryPolicy,
}

impl BuildkiteClient {
    pub fn new(base_url: &str, token: Token, timeout: Duration) -> Result<Self> {
        if token.is_empty() {
            return Err(MetricsError::Config("Must provide a value for token".into()));
        }

        let client = Client::builder()
            .user_agent(concat!("buildkite-metrics/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| MetricsError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last segment unless the base ends with a slash
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let api_url = Url::parse(&normalized)
            .map_err(|e| MetricsError::Config(format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            per_page: PAGE_SIZE,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_page_size(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(self.token.as_str())
    }

    /// URL of the first page of builds for `org` matching `query`.
    pub fn builds_url(&self, org: &str, query: &BuildsQuery) -> Result<Url> {
        if org.trim().is_empty() {
            return Err(MetricsError::Config("Must provide a value for org".into()));
        }

        let mut url = self
            .api_url
            .join(&format!("organizations/{org}/builds"))
            .map_err(|e| MetricsError::Config(format!("Invalid organization URL: {e}")))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("per_page", &self.per_page.to_string());
            pairs.append_pair("page", "1");
            if let Some(from) = query.created_from {
                pairs.append_pair("created_from", &from.format(QUERY_TIME_FORMAT).to_string());
            }
            if let Some(to) = query.created_to {
                pairs.append_pair("created_to", &to.format(QUERY_TIME_FORMAT).to_string());
            }
            if let Some(from) = query.finished_from {
                pairs.append_pair("finished_from", &from.format(QUERY_TIME_FORMAT).to_string());
            }
            if let Some(state) = &query.state {
                pairs.append_pair("state", state.as_str());
            }
        }

        Ok(url)
    }

    /// Fetches and decodes a single page of builds.
    ///
    /// # Errors
    ///
    /// - `Fetch` for a non-success status (after any configured retries)
    /// - `Decode` if the body is not a JSON array of builds
    /// - `ContinuationParse` if the `Link` header is malformed
    /// - `Network` for transport failures
    pub async fn fetch_page(&self, url: &Url) -> Result<Page> {
        let mut attempt = 0;
        loop {
            let request = self.auth_request(self.client.get(url.clone()));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e)
                    if (e.is_connect() || e.is_timeout()) && attempt < self.retry.max_retries =>
                {
                    attempt += 1;
                    warn!(
                        "Network error ({e}), retrying in {}s ({attempt}/{})...",
                        self.retry.delay.as_secs(),
                        self.retry.max_retries
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                && attempt < self.retry.max_retries
            {
                attempt += 1;
                warn!(
                    "Buildkite API error (status {status}), retrying in {}s ({attempt}/{})...",
                    self.retry.delay.as_secs(),
                    self.retry.max_retries
                );
                tokio::time::sleep(self.retry.delay).await;
                continue;
            }

            if !status.is_success() {
                return Err(MetricsError::Fetch {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let next = match response.headers().get(LINK) {
                Some(value) => {
                    let header = value.to_str().map_err(|_| MetricsError::ContinuationParse {
                        header: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                        reason: "header contains non-ASCII characters".into(),
                    })?;
                    resolve_next(url, header)?
                }
                None => None,
            };

            let body = response.text().await?;
            let builds: Vec<Build> =
                serde_json::from_str(&body).map_err(|source| MetricsError::Decode {
                    url: url.to_string(),
                    source,
                })?;

            debug!("Fetched {} builds from {url}", builds.len());

            return Ok(Page { builds, next });
        }
    }
}

fn resolve_next(current: &Url, header: &str) -> Result<Option<Url>> {
    links::next_page_url(header)?
        .map(|next| {
            current
                .join(&next)
                .map_err(|e| MetricsError::ContinuationParse {
                    header: header.to_string(),
                    reason: format!("invalid next URL: {e}"),
                })
        })
        .transpose()
}
