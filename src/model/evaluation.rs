//! Binary classification metrics.

/// Fraction of predictions equal to the label. `0.0` for empty input.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accuracy(labels: &[u8], predictions: &[u8]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .zip(predictions)
        .filter(|(y, p)| y == p)
        .count();
    correct as f64 / labels.len() as f64
}

/// Area under the ROC curve via the rank-sum statistic.
///
/// Tied scores share their average rank. Returns `None` when the labels hold
/// a single class, where AUC is undefined.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    let n = labels.len().min(scores.len());
    let positives = labels[..n].iter().filter(|&&y| y == 1).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based: start+1 ..= end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        positive_rank_sum += average_rank
            * order[start..end]
                .iter()
                .filter(|&&i| labels[i] == 1)
                .count() as f64;
        start = end;
    }

    let p = positives as f64;
    let q = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * q))
}
