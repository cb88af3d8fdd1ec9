use ndarray::Array2;
use rand::Rng;

/// Inverted dropout: kept activations are scaled by `1 / keep_prob` while training so that
/// evaluation can be the identity.
#[derive(Clone, Debug, Default)]
pub struct Dropout {
    mask: Option<Array2<f32>>,
}

impl Dropout {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Arguments
    /// * `x` - The input activations.
    /// * `keep_prob` - The probability of keeping each activation, `None` when evaluating.
    /// * `rng` - The random source for the mask.
    pub fn forward<R: Rng>(
        &mut self,
        mut x: Array2<f32>,
        keep_prob: Option<f32>,
        rng: &mut R,
    ) -> Array2<f32> {
        let Some(keep_prob) = keep_prob.filter(|&p| p < 1.) else {
            self.mask = None;
            return x;
        };

        let scale = 1. / keep_prob;
        let mask = Array2::from_shape_fn(x.raw_dim(), |_| {
            if rng.random::<f32>() < keep_prob { scale } else { 0. }
        });

        x *= &mask;
        self.mask = Some(mask);
        x
    }

    pub fn backward(&mut self, mut d: Array2<f32>) -> Array2<f32> {
        if let Some(mask) = &self.mask {
            d *= mask;
        }

        d
    }
}
