use ndarray::{Array1, Array2, ArrayView2, Axis, CowArray, Ix2};
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// Momentum of the running normalization statistics.
pub const MOMENTUM: f32 = 0.975;
/// Added to the standard deviation before dividing by it.
pub const EPSILON: f32 = 1e-10;

/// Per channel mean and standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormStats {
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
}

impl NormStats {
    /// Stats that leave the input untouched (mean 0, std 1).
    pub fn identity(channels: usize) -> Self {
        Self {
            mean: Array1::zeros(channels),
            std: Array1::ones(channels),
        }
    }

    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Computes the raw stats of `batch`, whose rows are samples laid out channel last, reducing
    /// over every axis except the channel one.
    pub fn of_batch(batch: ArrayView2<f32>, channels: usize) -> Result<Self> {
        let flat = channel_view(&batch, channels)?;
        let mean = flat
            .mean_axis(Axis(0))
            .ok_or(MlErr::EmptyInput("normalization batch"))?;
        let std = flat.std_axis(Axis(0), 0.);

        Ok(Self { mean, std })
    }
}

/// Keeps an exponentially weighted running estimate of the input statistics seen while training,
/// to normalize inputs at inference time.
#[derive(Debug, Clone)]
pub struct BatchStatsTracker {
    channels: usize,
    momentum: f32,
    running: Option<NormStats>,
}

impl BatchStatsTracker {
    /// Creates a new, uninitialized `BatchStatsTracker`.
    ///
    /// # Arguments
    /// * `channels` - The width of the last (channel) axis of every sample.
    /// * `momentum` - The weight of the running estimate on every blend, within `[0, 1]`.
    pub fn new(channels: usize, momentum: f32) -> Result<Self> {
        if !(0. ..=1.).contains(&momentum) {
            return Err(MlErr::InvalidMomentum(momentum));
        }

        if channels == 0 {
            return Err(MlErr::EmptyInput("channel axis"));
        }

        Ok(Self {
            channels,
            momentum,
            running: None,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the running estimate, `None` until the first `update`.
    pub fn running(&self) -> Option<&NormStats> {
        self.running.as_ref()
    }

    /// Computes the raw stats of `batch` and blends them into the running estimate. The first
    /// batch seeds the estimate.
    ///
    /// # Returns
    /// The raw stats of `batch`.
    pub fn update(&mut self, batch: ArrayView2<f32>) -> Result<NormStats> {
        let stats = NormStats::of_batch(batch, self.channels)?;
        let m = self.momentum;

        self.running = Some(match self.running.take() {
            Some(running) => NormStats {
                mean: running.mean * m + &stats.mean * (1. - m),
                std: running.std * m + &stats.std * (1. - m),
            },
            None => stats.clone(),
        });

        Ok(stats)
    }

    /// Returns the stats to normalize inference batches with: the running mean and the running
    /// std scaled by `n / (n - 1)`.
    ///
    /// # Arguments
    /// * `batch_size` - The training batch size `n` the running estimate was built from.
    pub fn inference_stats(&self, batch_size: usize) -> Result<NormStats> {
        let running = self.running.as_ref().ok_or(MlErr::StatsUninitialized)?;
        if batch_size < 2 {
            return Err(MlErr::InvalidBatchSize(batch_size));
        }

        let correction = batch_size as f32 / (batch_size - 1) as f32;
        Ok(NormStats {
            mean: running.mean.clone(),
            std: &running.std * correction,
        })
    }
}

/// Applies `(x - mean) / (std + EPSILON)` channelwise.
pub fn normalize(x: ArrayView2<f32>, stats: &NormStats) -> Result<Array2<f32>> {
    let dim = x.raw_dim();
    let flat = channel_view(&x, stats.channels())?;
    let out = (&flat - &stats.mean) / &(&stats.std + EPSILON);
    Ok(out.into_shape_with_order(dim)?)
}

/// The inverse of `normalize` for the same `stats`.
pub fn denormalize(x: ArrayView2<f32>, stats: &NormStats) -> Result<Array2<f32>> {
    let dim = x.raw_dim();
    let flat = channel_view(&x, stats.channels())?;
    let out = &flat * &(&stats.std + EPSILON) + &stats.mean;
    Ok(out.into_shape_with_order(dim)?)
}

/// Views `x` as `(samples * positions, channels)`.
fn channel_view<'a>(x: &'a ArrayView2<'_, f32>, channels: usize) -> Result<CowArray<'a, f32, Ix2>> {
    let (rows, width) = x.dim();
    if rows == 0 {
        return Err(MlErr::EmptyInput("batch"));
    }

    if channels == 0 || width % channels != 0 {
        return Err(MlErr::SizeMismatch {
            what: "sample width (multiple of the channel count)",
            got: width,
            expected: channels,
        });
    }

    Ok(x.to_shape((rows * width / channels, channels))?)
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;

    #[test]
    fn reduces_every_axis_but_the_channel() {
        // two samples of two pixels with two channels each
        let batch = array![[1., 10., 3., 10.], [5., 20., 7., 20.]];
        let stats = NormStats::of_batch(batch.view(), 2).unwrap();
        assert_eq!(stats.mean, array![4., 15.]);
        assert!((stats.std[0] - 5f32.sqrt()).abs() < 1e-6);
        assert!((stats.std[1] - 5.).abs() < 1e-6);
    }

    #[test]
    fn first_batch_seeds_then_blends_with_momentum() {
        let mut tracker = BatchStatsTracker::new(1, MOMENTUM).unwrap();
        assert!(tracker.running().is_none());

        tracker.update(array![[1.], [3.]].view()).unwrap();
        assert_eq!(tracker.running().unwrap().mean, array![2.]);
        assert_eq!(tracker.running().unwrap().std, array![1.]);

        tracker.update(array![[10.], [10.]].view()).unwrap();
        let running = tracker.running().unwrap();
        assert!((running.mean[0] - (0.975 * 2. + 0.025 * 10.)).abs() < 1e-6);
        assert!((running.std[0] - 0.975).abs() < 1e-6);
    }

    #[test]
    fn running_std_stays_non_negative() {
        let mut tracker = BatchStatsTracker::new(3, 0.5).unwrap();
        for i in 0..20 {
            let batch = Array2::from_shape_fn((4, 6), |(r, c)| ((r * 7 + c * 3 + i) % 5) as f32 - 2.);
            tracker.update(batch.view()).unwrap();
            assert!(tracker.running().unwrap().std.iter().all(|&s| s >= 0.));
        }
    }

    #[test]
    fn momentum_outside_unit_interval_is_rejected() {
        assert!(matches!(
            BatchStatsTracker::new(1, 1.5),
            Err(MlErr::InvalidMomentum(_))
        ));
        assert!(BatchStatsTracker::new(1, -0.1).is_err());
        assert!(BatchStatsTracker::new(1, 0.).is_ok());
        assert!(BatchStatsTracker::new(1, 1.).is_ok());
    }

    #[test]
    fn inference_stats_need_a_seeded_tracker() {
        let tracker = BatchStatsTracker::new(1, MOMENTUM).unwrap();
        assert!(matches!(
            tracker.inference_stats(16),
            Err(MlErr::StatsUninitialized)
        ));
    }

    #[test]
    fn inference_std_gets_the_unbiased_correction() {
        let mut tracker = BatchStatsTracker::new(1, MOMENTUM).unwrap();
        tracker.update(array![[1.], [3.]].view()).unwrap();

        let stats = tracker.inference_stats(16).unwrap();
        assert!((stats.std[0] - 16. / 15.).abs() < 1e-6);
        assert_eq!(stats.mean, array![2.]);
        assert!(matches!(
            tracker.inference_stats(1),
            Err(MlErr::InvalidBatchSize(1))
        ));
    }

    #[test]
    fn normalize_then_denormalize_recovers_the_batch() {
        let batch = array![[0.5, 200., -3.], [1.5, 180., 4.], [9., 0., 0.]];
        let stats = NormStats::of_batch(batch.view(), 3).unwrap();

        let normalized = normalize(batch.view(), &stats).unwrap();
        let back = denormalize(normalized.view(), &stats).unwrap();
        for (a, b) in batch.iter().zip(&back) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn zero_std_does_not_divide_by_zero() {
        let batch = array![[2., 2.], [2., 2.]];
        let stats = NormStats::of_batch(batch.view(), 2).unwrap();
        let normalized = normalize(batch.view(), &stats).unwrap();
        assert!(normalized.iter().all(|v| v.is_finite()));
    }
}
