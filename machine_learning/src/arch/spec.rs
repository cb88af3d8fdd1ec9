use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use super::activations::ActFn;
use crate::{MlErr, Result};

/// How the parameters of a layer are initialized when training starts from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamInit {
    /// Uniform weights within `±sqrt(6 / (fan_in + fan_out))`, zero biases.
    Xavier,
    Const { value: f32 },
    /// Pretrained values laid out as `[weights (row major), biases]`.
    Values { values: Vec<f32> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Avg,
    Max,
}

/// The declarative description of a single layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        name: String,
        dim: (usize, usize),
        act_fn: Option<ActFn>,
        trainable: bool,
        init: ParamInit,
    },
    Pool {
        name: String,
        size: usize,
        kind: PoolKind,
    },
    Dropout {
        name: String,
    },
}

impl LayerSpec {
    pub fn name(&self) -> &str {
        match self {
            LayerSpec::Dense { name, .. }
            | LayerSpec::Pool { name, .. }
            | LayerSpec::Dropout { name } => name,
        }
    }

    /// Returns the amount of parameters this layer owns.
    pub fn size(&self) -> usize {
        match self {
            LayerSpec::Dense { dim, .. } => (dim.0 + 1) * dim.1,
            _ => 0,
        }
    }

    /// Returns the output width of this layer given its input width.
    fn output_dim(&self, input: usize) -> Result<usize> {
        match *self {
            LayerSpec::Dense { dim, .. } => {
                if dim.0 != input {
                    return Err(MlErr::SizeMismatch {
                        what: "dense layer input",
                        got: input,
                        expected: dim.0,
                    });
                }

                Ok(dim.1)
            }
            LayerSpec::Pool { size, .. } => {
                if size == 0 || input % size != 0 {
                    return Err(MlErr::SizeMismatch {
                        what: "pool layer input (multiple of the pool size)",
                        got: input,
                        expected: size,
                    });
                }

                Ok(input / size)
            }
            LayerSpec::Dropout { .. } => Ok(input),
        }
    }
}

/// An ordered list of layer specs. A concrete `Sequential` is always instantiated from one of
/// these, both for a fresh training run and when rebuilding from a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub input_dim: usize,
    pub layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    /// The trainable head used when no network is configured: two hidden fully connected layers
    /// with dropout and a two logit output.
    pub fn default_head(input_dim: usize) -> Self {
        let dense = |name: &str, dim, act_fn| LayerSpec::Dense {
            name: name.to_string(),
            dim,
            act_fn,
            trainable: true,
            init: ParamInit::Xavier,
        };
        let dropout = |name: &str| LayerSpec::Dropout {
            name: name.to_string(),
        };

        Self {
            input_dim,
            layers: vec![
                dense("fc6", (input_dim, 64), Some(ActFn::relu())),
                dropout("dropout_6"),
                dense("fc7", (64, 32), Some(ActFn::relu())),
                dropout("dropout_7"),
                dense("softmax", (32, 2), None),
            ],
        }
    }

    /// Checks that every layer accepts the output of the previous one.
    ///
    /// # Returns
    /// The output width of the whole network.
    pub fn validate(&self) -> Result<usize> {
        if self.layers.is_empty() {
            return Err(MlErr::EmptyInput("network spec"));
        }

        self.layers
            .iter()
            .try_fold(self.input_dim, |dim, layer| layer.output_dim(dim))
    }

    /// Returns the total amount of parameters of the network.
    pub fn size(&self) -> usize {
        self.layers.iter().map(LayerSpec::size).sum()
    }

    /// Generates the initial flat parameter vector following each layer's `ParamInit`.
    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params = Vec::with_capacity(self.size());

        for layer in &self.layers {
            let LayerSpec::Dense { dim, init, .. } = layer else {
                continue;
            };

            let w_size = dim.0 * dim.1;
            match init {
                ParamInit::Xavier => {
                    let limit = (6. / (dim.0 + dim.1) as f32).sqrt();
                    let dist = Uniform::new_inclusive(-limit, limit)
                        .map_err(|_| MlErr::EmptyInput("xavier range"))?;

                    params.extend(dist.sample_iter(&mut *rng).take(w_size));
                    params.extend(std::iter::repeat_n(0., dim.1));
                }
                ParamInit::Const { value } => {
                    params.extend(std::iter::repeat_n(*value, layer.size()));
                }
                ParamInit::Values { values } => {
                    if values.len() != layer.size() {
                        return Err(MlErr::SizeMismatch {
                            what: "pretrained layer values",
                            got: values.len(),
                            expected: layer.size(),
                        });
                    }

                    params.extend_from_slice(values);
                }
            }
        }

        Ok(params)
    }
}
