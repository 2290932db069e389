//! Binary classification metrics used for cross-validation.

const EPS: f64 = 1e-15;

/// Area under the ROC curve via the rank-sum statistic; tied scores share
/// their average rank.
///
/// Returns `None` when `labels` holds only one class (the curve is undefined).
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> Option<f64> {
    debug_assert_eq!(labels.len(), scores.len());
    let n_pos = labels.iter().filter(|&&y| y == 1.0).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie block [start, end) shares their mean.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        rank_sum_pos += avg_rank * order[start..end].iter().filter(|&&i| labels[i] == 1.0).count() as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Mean binary cross-entropy with probabilities clipped to `[eps, 1 - eps]`.
///
/// Returns `None` for empty input.
pub fn log_loss(labels: &[f64], probs: &[f64]) -> Option<f64> {
    debug_assert_eq!(labels.len(), probs.len());
    if labels.is_empty() {
        return None;
    }
    let total: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    Some(total / labels.len() as f64)
}
