use ndarray::{Array2, ArrayView2};

/// A loss over a batch of output logits. Both methods average over the rows (samples).
pub trait LossFn {
    fn loss(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// The derivative of `loss` with respect to every logit.
    fn loss_prime(&self, logits: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}
