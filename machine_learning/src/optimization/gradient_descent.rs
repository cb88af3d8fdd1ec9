use super::Optimizer;
use crate::{MlErr, Result};

/// Gradient descent optimization algorithm.
#[derive(Debug, Default, Clone, Copy)]
pub struct GradientDescent;

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    pub fn new() -> Self {
        Self
    }
}

impl Optimizer for GradientDescent {
    /// Updates the parameters according to the algorithm's learning rule, that is, making a step in
    /// the opposite direction of the gradient, with a length of `learning_rate`.
    fn update_params(&mut self, learning_rate: f32, params: &mut [f32], grad: &[f32]) -> Result<()> {
        if grad.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: params.len(),
            });
        }

        for (w, g) in params.iter_mut().zip(grad) {
            *w -= learning_rate * g;
        }

        Ok(())
    }
}
