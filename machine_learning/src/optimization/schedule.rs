use serde::{Deserialize, Serialize};

/// Continuous exponential learning rate decay:
/// `base * decay_rate ^ (step / decay_steps)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialDecay {
    pub base: f32,
    pub decay_rate: f32,
    pub decay_steps: usize,
}

impl ExponentialDecay {
    pub fn new(base: f32, decay_rate: f32, decay_steps: usize) -> Self {
        Self {
            base,
            decay_rate,
            decay_steps,
        }
    }

    pub fn learning_rate(&self, step: usize) -> f32 {
        let exponent = step as f64 / self.decay_steps.max(1) as f64;
        (self.base as f64 * (self.decay_rate as f64).powf(exponent)) as f32
    }
}
