use ndarray::{Array2, ArrayView2};
use rand::{SeedableRng, rngs::StdRng};

use super::{NetworkSpec, layers::Layer, loss::LossFn};
use crate::{MlErr, Result};

/// Whether a forward pass is part of a training step or of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pass {
    Train { keep_prob: f32 },
    Eval,
}

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers. It does not own its parameters, they are handed to it
/// as a flat slice on every call.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    size: usize,
    rng: StdRng,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    /// * `seed` - The seed for the dropout masks.
    pub fn new<I>(layers: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<_> = layers.into_iter().collect();

        Self {
            size: layers.iter().map(Layer::size).sum(),
            layers,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Instantiates the concrete model described by `spec`.
    pub fn from_spec(spec: &NetworkSpec, seed: u64) -> Result<Self> {
        spec.validate()?;
        Ok(Self::new(spec.layers.iter().map(Layer::from_spec), seed))
    }

    /// Instantiates a fresh model from `spec` that will be driven by already trained `params`,
    /// for instance the ones restored from a checkpoint.
    pub fn rebuild(spec: &NetworkSpec, params: &[f32], seed: u64) -> Result<Self> {
        let model = Self::from_spec(spec, seed)?;
        model.check_len("parameters", params.len())?;
        Ok(model)
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Makes a forward pass through the network.
    ///
    /// # Returns
    /// The output logits for the given input.
    pub fn forward(&mut self, params: &[f32], mut x: Array2<f32>, pass: Pass) -> Result<Array2<f32>> {
        self.check_len("parameters", params.len())?;

        let keep_prob = match pass {
            Pass::Train { keep_prob } => Some(keep_prob),
            Pass::Eval => None,
        };

        let mut offset = 0;
        for layer in self.layers.iter_mut() {
            let size = layer.size();
            x = layer.forward(&params[offset..offset + size], x, keep_prob, &mut self.rng)?;
            offset += size;
        }

        Ok(x)
    }

    /// Propagates `d`, the derivative of the loss with respect to the output logits, back through
    /// the layers of the last forward pass, writing the gradient into `grad`.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Result<()> {
        self.check_len("parameters", params.len())?;
        self.check_len("gradient", grad.len())?;

        let mut end = self.size;
        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }

    /// Forwards a training batch, evaluates the objective (loss plus L2 penalty) and fills `grad`
    /// with its gradient. The parameters are not modified.
    ///
    /// # Returns
    /// A tuple with the output logits and the value of the objective.
    #[allow(clippy::too_many_arguments)]
    pub fn backprop<L>(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        x: Array2<f32>,
        y: ArrayView2<f32>,
        loss_fn: &L,
        l2_beta: f32,
        keep_prob: f32,
    ) -> Result<(Array2<f32>, f32)>
    where
        L: LossFn + ?Sized,
    {
        let logits = self.forward(params, x, Pass::Train { keep_prob })?;
        let objective = loss_fn.loss(logits.view(), y) + l2_beta * self.l2_penalty(params);

        let d = loss_fn.loss_prime(logits.view(), y);
        self.backward(params, grad, d)?;
        self.add_l2_grad(params, grad, l2_beta);

        Ok((logits, objective))
    }

    /// Returns `Σ w² / 2` over the weights of every trainable layer.
    pub fn l2_penalty(&self, params: &[f32]) -> f32 {
        self.regularized_ranges()
            .map(|range| params[range].iter().map(|w| w * w).sum::<f32>() / 2.)
            .sum()
    }

    fn add_l2_grad(&self, params: &[f32], grad: &mut [f32], beta: f32) {
        for range in self.regularized_ranges() {
            grad[range.clone()]
                .iter_mut()
                .zip(&params[range])
                .for_each(|(g, w)| *g += beta * w);
        }
    }

    fn regularized_ranges(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        self.layers.iter().scan(0, |offset, layer| {
            let start = *offset;
            *offset += layer.size();
            Some(start..start + layer.regularized_len())
        })
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::{LayerSpec, ParamInit, PoolKind, activations::ActFn, loss::CrossEntropy};

    fn small_spec() -> NetworkSpec {
        NetworkSpec {
            input_dim: 4,
            layers: vec![
                LayerSpec::Dense {
                    name: "frozen".into(),
                    dim: (4, 4),
                    act_fn: None,
                    trainable: false,
                    init: ParamInit::Xavier,
                },
                LayerSpec::Pool {
                    name: "pool".into(),
                    size: 2,
                    kind: PoolKind::Max,
                },
                LayerSpec::Dense {
                    name: "fc".into(),
                    dim: (2, 3),
                    act_fn: Some(ActFn::sigmoid(1.)),
                    trainable: true,
                    init: ParamInit::Xavier,
                },
                LayerSpec::Dropout {
                    name: "dropout".into(),
                },
                LayerSpec::Dense {
                    name: "out".into(),
                    dim: (3, 2),
                    act_fn: None,
                    trainable: true,
                    init: ParamInit::Xavier,
                },
            ],
        }
    }

    #[test]
    fn rebuild_rejects_foreign_parameters() {
        let spec = small_spec();
        assert!(Sequential::rebuild(&spec, &vec![0.; spec.size()], 0).is_ok());
        assert!(matches!(
            Sequential::rebuild(&spec, &vec![0.; spec.size() + 1], 0),
            Err(MlErr::SizeMismatch { .. })
        ));
    }

    #[test]
    fn rebuilt_model_reproduces_the_outputs() {
        let spec = small_spec();
        let params = spec.init_params(&mut StdRng::seed_from_u64(11)).unwrap();
        let x = array![[0.1, 0.2, 0.3, 0.4], [1., -1., 0.5, 0.]];

        let mut a = Sequential::from_spec(&spec, 1).unwrap();
        let mut b = Sequential::rebuild(&spec, &params, 2).unwrap();
        let ya = a.forward(&params, x.clone(), Pass::Eval).unwrap();
        let yb = b.forward(&params, x, Pass::Eval).unwrap();
        assert_eq!(ya, yb);
        assert_eq!(ya.dim(), (2, 2));
    }

    #[test]
    fn backprop_leaves_frozen_gradient_empty_and_matches_finite_differences() {
        let spec = small_spec();
        let params = spec.init_params(&mut StdRng::seed_from_u64(5)).unwrap();
        let x = array![[0.1, 0.7, -0.3, 0.4], [0.9, -0.2, 0.5, 0.3]];
        let y = array![[1., 0.], [0., 1.]];
        let beta = 0.1;

        let mut model = Sequential::from_spec(&spec, 0).unwrap();
        let mut grad = vec![0.; spec.size()];
        // keep_prob = 1 disables dropout so the objective is deterministic.
        model
            .backprop(&params, &mut grad, x.clone(), y.view(), &CrossEntropy, beta, 1.)
            .unwrap();

        assert!(grad[..20].iter().all(|&g| g == 0.));

        let objective = |p: &[f32]| {
            let mut m = Sequential::from_spec(&spec, 0).unwrap();
            let logits = m.forward(p, x.clone(), Pass::Eval).unwrap();
            CrossEntropy.loss(logits.view(), y.view()) + beta * m.l2_penalty(p)
        };

        let h = 1e-3;
        for i in 20..params.len() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += h;
            minus[i] -= h;
            let numeric = (objective(&plus) - objective(&minus)) / (2. * h);
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", grad[i]);
        }
    }
}
