//! Bucket partitioning for worker pools

use crate::types::PipeError;

/// Number of workers for `items` pieces of work: one per CPU, never more than the items
pub fn worker_count(items: usize) -> usize {
    num_cpus::get().min(items)
}

/// Split `items` into at most `buckets` disjoint buckets by index modulo
///
/// Item `i` lands in bucket `i % buckets`, so every bucket keeps the input
/// order of its own items. No empty buckets are produced when there are
/// fewer items than buckets.
///
/// # Errors
///
/// Returns [`PipeError::InvalidBucketCount`] when `buckets` is zero and
/// there is something to split.
pub fn partition<T>(buckets: usize, items: Vec<T>) -> Result<Vec<Vec<T>>, PipeError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    if buckets == 0 {
        return Err(PipeError::InvalidBucketCount { count: buckets });
    }

    let buckets = buckets.min(items.len());
    let mut split: Vec<Vec<T>> = (0..buckets).map(|_| Vec::new()).collect();

    for (i, item) in items.into_iter().enumerate() {
        split[i % buckets].push(item);
    }

    Ok(split)
}
