mod styling;
mod summary;
mod tables;

use styling::{dim, magenta_bold};
pub use summary::print_result_set;

/// Prints the `buildkite-metrics` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("📈 buildkite-metrics"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Buildkite queue and pipeline metrics collector")
    );
}
