use ndarray::{Array2, ArrayView2, Axis};

/// Lower bound applied to a probability before taking its logarithm.
pub const PROB_MIN: f64 = 1e-15;
/// Upper bound applied to a probability before taking its logarithm.
pub const PROB_MAX: f64 = 1. - 1e-15;

/// Row-wise softmax of `logits`.
pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut probs = logits.to_owned();

    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |acc, &z| acc.max(z));
        row.mapv_inplace(|z| (z - max).exp());
        let sum = row.sum();
        row /= sum;
    }

    probs
}

/// Clamps `p` to `[PROB_MIN, PROB_MAX]`, the domain in which `ln` stays finite.
#[inline]
pub fn clamp_prob(p: f32) -> f64 {
    (p as f64).clamp(PROB_MIN, PROB_MAX)
}
