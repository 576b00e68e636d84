pub mod buildkite;
