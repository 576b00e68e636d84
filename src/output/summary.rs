use comfy_table::Cell;

use super::styling::{bright, bright_yellow, cyan, dim};
use super::tables::{count_cell, create_table, header_cells};
use crate::metrics::{CountSnapshot, ResultSet};

const HEADERS: [&str; 6] = [
    "Scope",
    "Name",
    "Running builds",
    "Running jobs",
    "Scheduled builds",
    "Scheduled jobs",
];

/// Renders the totals, then every queue, then every pipeline as one table.
pub fn render_result_set(result: &ResultSet) -> String {
    let mut table = create_table();
    table.set_header(header_cells(&HEADERS));

    for (dimension, counts) in result.snapshots() {
        let (scope, name) = match dimension {
            Some((dimension, name)) => (dimension.as_str(), name),
            None => ("Total", "*"),
        };
        table.add_row(row(scope, name, counts));
    }

    table.to_string()
}

fn row(scope: &str, name: &str, counts: &CountSnapshot) -> Vec<Cell> {
    vec![
        Cell::new(scope),
        Cell::new(name),
        count_cell(counts.running_builds),
        count_cell(counts.running_jobs),
        count_cell(counts.scheduled_builds),
        count_cell(counts.scheduled_jobs),
    ]
}

/// Prints the counts of a dry-run cycle to stderr.
pub fn print_result_set(org: &str, result: &ResultSet) {
    let active = result.totals.running_builds + result.totals.scheduled_builds;

    eprintln!(
        "\n{} {}",
        bright_yellow("📊 Counts for"),
        cyan(org)
    );
    eprintln!(
        "{} {} {} {}",
        dim("  Active builds:"),
        bright(active),
        dim("across queues:"),
        bright(result.queues.len())
    );
    eprintln!("{}", render_result_set(result));
}
