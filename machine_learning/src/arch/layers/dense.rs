use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer. Its parameters are laid out as `[w (row major), b]`.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    trainable: bool,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Returns a new `Dense`.
    ///
    /// # Arguments
    /// * `dim` - The input and output widths.
    /// * `act_fn` - An optional activation applied to the weighted sums.
    /// * `trainable` - Whether the optimizer is allowed to move this layer's parameters.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>, trainable: bool) -> Self {
        let zeros = Array2::zeros((1, 1));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            trainable,
            x: zeros.clone(),
            z: zeros,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the amount of weights (biases excluded) this layer has.
    pub fn weights_len(&self) -> usize {
        self.size - self.dim.1
    }

    pub fn trainable(&self) -> bool {
        self.trainable
    }

    pub fn forward(&mut self, params: &[f32], x: Array2<f32>) -> Result<Array2<f32>> {
        let (w, b) = self.view_params(params)?;

        let mut z = x.dot(&w);
        z += &b;
        self.x = x;

        let Some(act_fn) = self.act_fn else {
            return Ok(z);
        };

        let a = z.mapv(|z| act_fn.f(z));
        self.z = z;
        Ok(a)
    }

    /// Writes this layer's gradient into `grad` and returns the delta for the previous layer.
    /// Frozen layers leave their gradient zeroed.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if let Some(act_fn) = self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        if self.trainable {
            let (mut dw, mut db) = self.view_grad(grad)?;
            linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
            db.assign(&d.sum_axis(Axis(0)));
        } else {
            grad.fill(0.);
        }

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let (dw_raw, db_raw) = grad.split_at_mut(self.weights_len());
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let (w_raw, b_raw) = params.split_at(self.weights_len());
        let weights = ArrayView2::from_shape(self.dim, w_raw)?;
        let biases = ArrayView1::from_shape(self.dim.1, b_raw)?;
        Ok((weights, biases))
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

    #[test]
    fn forward_computes_affine_map() {
        let mut dense = Dense::new((2, 1), None, true);
        let params = [2., -1., 0.5];

        let y = dense.forward(&params, array![[1., 1.], [3., 2.]]).unwrap();
        assert_eq!(y, array![[1.5], [4.5]]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let act = Some(ActFn::sigmoid(1.));
        let x = array![[0.3, -0.2], [1.0, 0.4], [-0.5, 0.9]];
        let params = vec![0.1, -0.3, 0.2, 0.5, 0.05, -0.1];

        // loss = sum(outputs)
        let loss = |p: &[f32]| {
            let mut d = Dense::new((2, 2), act, true);
            d.forward(p, x.clone()).unwrap().sum()
        };

        let mut dense = Dense::new((2, 2), act, true);
        let y = dense.forward(&params, x.clone()).unwrap();
        let mut grad = vec![0.; params.len()];
        dense
            .backward(&params, &mut grad, Array2::ones(y.raw_dim()))
            .unwrap();

        let h = 1e-3;
        for i in 0..params.len() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += h;
            minus[i] -= h;
            let numeric = (loss(&plus) - loss(&minus)) / (2. * h);
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", grad[i]);
        }
    }

    #[test]
    fn frozen_layer_keeps_zero_gradient_but_propagates_delta() {
        let mut dense = Dense::new((2, 1), None, false);
        let params = [1., 2., 0.];
        dense.forward(&params, array![[1., 1.]]).unwrap();

        let mut grad = vec![9.; 3];
        let d = dense.backward(&params, &mut grad, array![[1.]]).unwrap();
        assert_eq!(grad, vec![0.; 3]);
        assert_eq!(d, array![[1., 2.]]);
    }

    #[test]
    fn wrong_parameter_count_is_an_error() {
        let mut dense = Dense::new((2, 2), None, true);
        let err = dense.forward(&[0.; 5], Array2::zeros((1, 2))).unwrap_err();
        assert!(matches!(err, MlErr::SizeMismatch { got: 5, expected: 6, .. }));
    }
}
