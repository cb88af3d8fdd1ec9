use ndarray::Array2;
use rand::Rng;

use super::{Dense, Dropout, Pool};
use crate::{
    Result,
    arch::{LayerSpec, activations::ActFn},
};

#[derive(Clone, Debug)]
pub enum Layer {
    Dense(Dense),
    Pool(Pool),
    Dropout(Dropout),
}

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>, trainable: bool) -> Self {
        Self::Dense(Dense::new(dim, act_fn, trainable))
    }

    /// Instantiates the concrete layer described by `spec`.
    pub fn from_spec(spec: &LayerSpec) -> Self {
        match spec {
            LayerSpec::Dense {
                dim,
                act_fn,
                trainable,
                ..
            } => Self::dense(*dim, *act_fn, *trainable),
            LayerSpec::Pool { size, kind, .. } => Self::Pool(Pool::new(*size, *kind)),
            LayerSpec::Dropout { .. } => Self::Dropout(Dropout::new()),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Dense(l) => l.size(),
            _ => 0,
        }
    }

    /// Returns the amount of leading parameters that are trainable weights, the ones subject to
    /// L2 regularization.
    pub fn regularized_len(&self) -> usize {
        match self {
            Self::Dense(l) if l.trainable() => l.weights_len(),
            _ => 0,
        }
    }

    pub fn forward<R: Rng>(
        &mut self,
        params: &[f32],
        x: Array2<f32>,
        keep_prob: Option<f32>,
        rng: &mut R,
    ) -> Result<Array2<f32>> {
        match self {
            Self::Dense(l) => l.forward(params, x),
            Self::Pool(l) => l.forward(x),
            Self::Dropout(l) => Ok(l.forward(x, keep_prob, rng)),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Self::Dense(l) => l.backward(params, grad, d),
            Self::Pool(l) => l.backward(d),
            Self::Dropout(l) => Ok(l.backward(d)),
        }
    }
}
