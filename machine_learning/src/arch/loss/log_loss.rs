use ndarray::{Array2, ArrayView2, Axis, Zip};

use super::{LossFn, PROB_MAX, PROB_MIN, clamp_prob, softmax};
use crate::evaluation::argmax;

/// Log loss over the softmax of the logits, with every probability clamped to
/// `[PROB_MIN, PROB_MAX]` before the logarithm. Clamped probabilities do not propagate gradient.
#[derive(Default, Clone, Copy, Debug)]
pub struct LogLoss;

impl LossFn for LogLoss {
    fn loss(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = logits.nrows().max(1) as f64;
        let probs = softmax(logits);

        let total = Zip::from(&probs)
            .and(&y)
            .fold(0f64, |acc, &p, &y| acc - y as f64 * clamp_prob(p).ln());

        (total / n) as f32
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = logits.nrows().max(1) as f64;
        let mut d = softmax(logits);

        for (mut row, y) in d.axis_iter_mut(Axis(0)).zip(y.axis_iter(Axis(0))) {
            // dL/dp, zero wherever the clamp is active.
            let g: Vec<f64> = row
                .iter()
                .zip(y)
                .map(|(&p, &y)| {
                    let p = p as f64;
                    if (PROB_MIN..=PROB_MAX).contains(&p) {
                        -(y as f64) / p
                    } else {
                        0.
                    }
                })
                .collect();

            let s: f64 = row.iter().zip(&g).map(|(&p, g)| p as f64 * g).sum();
            row.iter_mut()
                .zip(&g)
                .for_each(|(p, g)| *p = ((*p as f64) * (g - s) / n) as f32);
        }

        d
    }
}

/// Log loss over logits that are first rescaled elementwise: by `correct` where the one-hot
/// prediction agrees with the label and by `incorrect` where it does not. The weights are
/// treated as constants when differentiating.
#[derive(Clone, Copy, Debug)]
pub struct WeightedLogLoss {
    pub correct: f32,
    pub incorrect: f32,
}

impl WeightedLogLoss {
    pub fn new(correct: f32, incorrect: f32) -> Self {
        Self { correct, incorrect }
    }

    /// Returns the elementwise weights for a batch of logits.
    pub fn weights(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let mut w = Array2::zeros(logits.raw_dim());

        for ((mut w, z), y) in w
            .axis_iter_mut(Axis(0))
            .zip(logits.axis_iter(Axis(0)))
            .zip(y.axis_iter(Axis(0)))
        {
            let predicted = argmax(z);
            for (j, (w, &y)) in w.iter_mut().zip(y).enumerate() {
                let one_hot = if j == predicted { 1. } else { 0. };
                *w = if y == one_hot { self.correct } else { self.incorrect };
            }
        }

        w
    }
}

impl LossFn for WeightedLogLoss {
    fn loss(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let weighted = &self.weights(logits, y) * &logits;
        LogLoss.loss(weighted.view(), y)
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let w = self.weights(logits, y);
        let weighted = &w * &logits;
        LogLoss.loss_prime(weighted.view(), y) * &w
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::loss::CrossEntropy;

    fn numeric_grad<L: LossFn>(loss: &L, logits: &Array2<f32>, y: &Array2<f32>) -> Array2<f32> {
        let h = 1e-3;
        let mut out = Array2::zeros(logits.raw_dim());
        for (idx, g) in out.indexed_iter_mut() {
            let mut plus = logits.clone();
            let mut minus = logits.clone();
            plus[idx] += h;
            minus[idx] -= h;
            *g = (loss.loss(plus.view(), y.view()) - loss.loss(minus.view(), y.view())) / (2. * h);
        }
        out
    }

    #[test]
    fn unclamped_log_loss_matches_cross_entropy() {
        let logits = array![[0.3, -0.2], [1.5, 0.1]];
        let y = array![[0., 1.], [1., 0.]];
        let a = LogLoss.loss(logits.view(), y.view());
        let b = CrossEntropy.loss(logits.view(), y.view());
        assert!((a - b).abs() < 1e-5);
    }

    #[test]
    fn saturated_probabilities_stay_finite() {
        let logits = array![[200., -200.]];
        let y = array![[0., 1.]];
        let loss = LogLoss.loss(logits.view(), y.view());
        assert!(loss.is_finite());
        assert!((loss as f64 - -(PROB_MIN.ln())).abs() < 1e-3);

        let d = LogLoss.loss_prime(logits.view(), y.view());
        assert!(d.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn log_loss_gradient_matches_finite_differences() {
        let logits = array![[0.3, -0.2], [1.5, 0.1], [-0.7, 0.4]];
        let y = array![[0., 1.], [1., 0.], [1., 0.]];
        let analytic = LogLoss.loss_prime(logits.view(), y.view());
        let numeric = numeric_grad(&LogLoss, &logits, &y);
        for (a, n) in analytic.iter().zip(&numeric) {
            assert!((a - n).abs() < 1e-3, "{a} vs {n}");
        }
    }

    #[test]
    fn weights_follow_prediction_agreement() {
        let loss = WeightedLogLoss::new(0.9, 1.3);
        let logits = array![[2., 1.], [2., 1.]];
        let y = array![[1., 0.], [0., 1.]];
        let w = loss.weights(logits.view(), y.view());
        assert_eq!(w, array![[0.9, 0.9], [1.3, 1.3]]);
    }

    #[test]
    fn weighted_gradient_matches_finite_differences() {
        let loss = WeightedLogLoss::new(0.9, 1.3);
        let logits = array![[0.8, -0.2], [1.5, 0.1], [-0.7, 0.4]];
        let y = array![[0., 1.], [1., 0.], [1., 0.]];
        let analytic = loss.loss_prime(logits.view(), y.view());
        let numeric = numeric_grad(&loss, &logits, &y);
        for (a, n) in analytic.iter().zip(&numeric) {
            assert!((a - n).abs() < 1e-3, "{a} vs {n}");
        }
    }
}
