/// Most data points a single `PutMetricData` call accepts.
pub const MAX_DATUMS_PER_CALL: usize = 10;

/// Splits `data` into consecutive chunks of at most `size` items, keeping
/// order. The last chunk holds the remainder; empty input yields no chunks.
pub fn chunk_metric_data<T>(size: usize, data: &[T]) -> Vec<&[T]> {
    data.chunks(size.max(1)).collect()
}
