//! Top-K selection over runs
//!
//! **Problem**: `ORDER BY metrics.<key> LIMIT K` over every run of an
//! experiment is O(N log N) when done with a full sort.
//!
//! **Solution**: bounded heap of size K, O(N log K).
//!
//! The ranking is a total order so that equal metric values never fall back
//! to storage order:
//!
//! 1. metric value per [`SortOrder`]; runs without the metric rank last
//! 2. `created_at` ascending (the earlier run wins)
//! 3. registry `sequence` ascending
//!
//! `created_at` is wall-clock time and is trusted to be monotonic across
//! runs; `sequence` only settles runs stamped with the same instant.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::experiment::RunRecord;
use crate::{Error, Result};

/// Sort order for Top-K selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SortOrder {
    /// Ascending order (smallest K values)
    Ascending,
    /// Descending order (largest K values)
    Descending,
}

/// Compare two runs by `metric`; `Ordering::Less` means `a` ranks ahead of `b`.
#[must_use]
pub fn compare_runs(a: &RunRecord, b: &RunRecord, metric: &str, order: SortOrder) -> Ordering {
    compare_values(a.metric(metric), b.metric(metric), order)
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| a.sequence().cmp(&b.sequence()))
}

fn compare_values(a: Option<f64>, b: Option<f64>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => match order {
            SortOrder::Ascending => x.total_cmp(&y),
            SortOrder::Descending => y.total_cmp(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// Heap entry; "greater" means ranked further back, so the max-heap top is the
// current worst candidate and is the one evicted.
struct Ranked<'a> {
    run: &'a RunRecord,
    metric: &'a str,
    order: SortOrder,
}

impl Ranked<'_> {
    fn rank(&self, other: &Self) -> Ordering {
        compare_runs(self.run, other.run, self.metric, self.order)
    }
}

impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for Ranked<'_> {}

impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank(other)
    }
}

impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Select the top `k` runs by `metric`, best first.
///
/// # Errors
///
/// Returns `InvalidInput` if `k` is zero.
///
/// # Examples
///
/// ```rust
/// use churnline::experiment::RunRecord;
/// use churnline::topk::{top_k_runs, SortOrder};
///
/// # fn main() -> churnline::Result<()> {
/// let mut runs = Vec::new();
/// for (seq, auc) in [0.91, 0.95, 0.93].into_iter().enumerate() {
///     let mut run = RunRecord::new(format!("run-{seq}"), "exp-1", seq as u64);
///     run.start();
///     run.record_metric("auc", auc)?;
///     runs.push(run);
/// }
///
/// let top = top_k_runs(&runs, "auc", 2, SortOrder::Descending)?;
/// assert_eq!(top[0].run_id(), "run-1");
/// assert_eq!(top[1].run_id(), "run-2");
/// # Ok(())
/// # }
/// ```
pub fn top_k_runs<'a, I>(runs: I, metric: &'a str, k: usize, order: SortOrder) -> Result<Vec<RunRecord>>
where
    I: IntoIterator<Item = &'a RunRecord>,
{
    if k == 0 {
        return Err(Error::InvalidInput("k must be greater than 0".to_string()));
    }

    let mut heap: BinaryHeap<Ranked<'a>> = BinaryHeap::with_capacity(k.saturating_add(1).min(1024));
    for run in runs {
        heap.push(Ranked { run, metric, order });
        if heap.len() > k {
            heap.pop();
        }
    }

    Ok(heap
        .into_sorted_vec()
        .into_iter()
        .map(|ranked| ranked.run.clone())
        .collect())
}
