mod client;
mod links;
mod pagination;
mod types;

pub use client::{BuildkiteClient, BuildsQuery, Page, RetryPolicy, DEFAULT_BASE_URL, PAGE_SIZE};
pub use types::{Activity, Build, Job, Pipeline, State, DEFAULT_QUEUE};
