mod aggregator;
mod batch;
mod counts;
mod extract;

pub use aggregator::{Aggregator, Inclusion};
pub use batch::{chunk_metric_data, MAX_DATUMS_PER_CALL};
pub use counts::{CountSnapshot, Dimension, ResultSet};
pub use extract::{extract_metrics, DataPoint, DimensionValue, MetricName, Unit};
