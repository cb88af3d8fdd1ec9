use ndarray::prelude::*;

use crate::{MlErr, Result, arch::PoolKind};

/// Pools groups of `size` consecutive features into one. It owns no parameters.
#[derive(Clone, Debug)]
pub struct Pool {
    size: usize,
    kind: PoolKind,

    input_width: usize,
    argmax: Array2<usize>,
}

impl Pool {
    pub fn new(size: usize, kind: PoolKind) -> Self {
        Self {
            size,
            kind,
            input_width: 0,
            argmax: Array2::zeros((0, 0)),
        }
    }

    pub fn forward(&mut self, x: Array2<f32>) -> Result<Array2<f32>> {
        let (rows, width) = x.dim();
        if self.size == 0 || width % self.size != 0 {
            return Err(MlErr::SizeMismatch {
                what: "pool input width",
                got: width,
                expected: self.size,
            });
        }

        self.input_width = width;
        let groups = x.to_shape((rows, width / self.size, self.size))?;

        match self.kind {
            PoolKind::Avg => groups
                .mean_axis(Axis(2))
                .ok_or(MlErr::EmptyInput("pool window")),
            PoolKind::Max => {
                self.argmax = groups.map_axis(Axis(2), |window| {
                    window
                        .iter()
                        .enumerate()
                        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                            if v > best.1 { (i, v) } else { best }
                        })
                        .0
                });

                Ok(groups.map_axis(Axis(2), |window| {
                    window.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v))
                }))
            }
        }
    }

    pub fn backward(&mut self, d: Array2<f32>) -> Result<Array2<f32>> {
        let rows = d.nrows();
        let mut out = Array3::<f32>::zeros((rows, self.input_width / self.size, self.size));

        match self.kind {
            PoolKind::Avg => {
                let share = 1. / self.size as f32;
                for ((r, g, _), v) in out.indexed_iter_mut() {
                    *v = d[[r, g]] * share;
                }
            }
            PoolKind::Max => {
                for ((r, g), &i) in self.argmax.indexed_iter() {
                    out[[r, g, i]] = d[[r, g]];
                }
            }
        }

        Ok(out.into_shape_with_order((rows, self.input_width))?)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn avg_pool_spreads_delta_evenly() {
        let mut pool = Pool::new(2, PoolKind::Avg);
        let y = pool.forward(array![[1., 3., 5., 7.]]).unwrap();
        assert_eq!(y, array![[2., 6.]]);

        let d = pool.backward(array![[1., 2.]]).unwrap();
        assert_eq!(d, array![[0.5, 0.5, 1., 1.]]);
    }

    #[test]
    fn max_pool_routes_delta_to_the_maximum() {
        let mut pool = Pool::new(2, PoolKind::Max);
        let y = pool.forward(array![[1., 3., 7., 5.], [0., -1., 2., 2.]]).unwrap();
        assert_eq!(y, array![[3., 7.], [0., 2.]]);

        let d = pool.backward(array![[1., 1.], [1., 1.]]).unwrap();
        assert_eq!(d, array![[0., 1., 1., 0.], [1., 0., 1., 0.]]);
    }
}
