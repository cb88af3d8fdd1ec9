use ndarray::{Array2, ArrayView2, Axis, Zip};

use super::{LossFn, softmax};

/// Softmax cross entropy computed straight from the logits.
#[derive(Default, Clone, Copy, Debug)]
pub struct CrossEntropy;

impl LossFn for CrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = logits.nrows().max(1) as f32;
        let mut total = 0.;

        for (z, y) in logits.axis_iter(Axis(0)).zip(y.axis_iter(Axis(0))) {
            let max = z.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            let log_sum = z.fold(0., |acc, &v| acc + (v - max).exp()).ln() + max;
            total += Zip::from(&z).and(&y).fold(0., |acc, &z, &y| acc - y * (z - log_sum));
        }

        total / n
    }

    fn loss_prime(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = logits.nrows().max(1) as f32;
        (softmax(logits) - &y) / n
    }
}
