//! Metrics.
//!
//! Metrics are evaluation helpers: they never participate in backprop. Counts are
//! accumulated batch by batch so training and evaluation stay allocation-free.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Supported evaluation metrics.
pub enum Metric {
    /// Categorical accuracy: fraction of rows whose argmax prediction equals the argmax of
    /// the one-hot target.
    Accuracy,
}

/// Index of the largest entry (first one on ties). Returns 0 for an empty row.
#[inline]
pub fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Number of rows in the batch where `argmax(pred) == argmax(target)`.
pub fn correct_count(pred: &[f32], target: &[f32], width: usize) -> usize {
    assert_eq!(pred.len(), target.len(), "pred/target shape mismatch");
    pred.chunks_exact(width)
        .zip(target.chunks_exact(width))
        .filter(|(p, t)| argmax(p) == argmax(t))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn correct_count_compares_row_argmaxes() {
        let pred = [0.9_f32, 0.1, 0.4, 0.6, 0.3, 0.7];
        let target = [1.0_f32, 0.0, 1.0, 0.0, 0.0, 1.0];
        assert_eq!(correct_count(&pred, &target, 2), 2);
    }
}
