use machine_learning::{
    arch::loss::{CrossEntropy, LossFn, softmax},
    evaluation,
};
use ndarray::ArrayView2;
use serde::Serialize;

use crate::{Result, config::LossType};

/// Accuracy, softmax cross-entropy and clamped log-loss of a set of predictions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub accuracy: f32,
    pub loss: f32,
    pub log_loss: f32,
}

impl Metrics {
    /// Measures a batch of raw network outputs against its one-hot targets.
    pub fn of_logits(logits: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Self> {
        let probs = softmax(logits);

        Ok(Self {
            accuracy: evaluation::accuracy(probs.view(), y)?,
            loss: CrossEntropy.loss(logits, y),
            log_loss: evaluation::log_loss(probs.view(), y)?,
        })
    }

    /// Measures already normalized probabilities. There is no separate loss for them, so it
    /// mirrors the log-loss.
    pub fn of_probabilities(probs: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Self> {
        let log_loss = evaluation::log_loss(probs, y)?;

        Ok(Self {
            accuracy: evaluation::accuracy(probs, y)?,
            loss: log_loss,
            log_loss,
        })
    }

    /// The metric early stopping follows for `loss_type`.
    pub fn quality_metric(&self, loss_type: LossType) -> f32 {
        match loss_type {
            LossType::CrossEntropy => self.accuracy,
            LossType::LogLoss | LossType::WeightedLogLoss => self.log_loss,
        }
    }
}

/// Running mean of per-batch metrics.
#[derive(Debug, Default, Clone)]
pub struct MetricsAccumulator {
    sum: Metrics,
    batches: usize,
}

impl MetricsAccumulator {
    #[inline]
    pub fn add(&mut self, m: &Metrics) {
        self.sum.accuracy += m.accuracy;
        self.sum.loss += m.loss;
        self.sum.log_loss += m.log_loss;
        self.batches += 1;
    }

    #[inline]
    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn mean(&self) -> Metrics {
        let n = self.batches.max(1) as f32;

        Metrics {
            accuracy: self.sum.accuracy / n,
            loss: self.sum.loss / n,
            log_loss: self.sum.log_loss / n,
        }
    }

    /// Returns the mean and starts over.
    pub fn take(&mut self) -> Metrics {
        let mean = self.mean();
        *self = Self::default();
        mean
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn logits_metrics() {
        let logits = array![[2., 0.], [0., 2.]];
        let y = array![[1., 0.], [1., 0.]];

        let m = Metrics::of_logits(logits.view(), y.view()).unwrap();
        assert_eq!(m.accuracy, 0.5);
        assert!(m.loss > 0.);
        assert!((m.loss - m.log_loss).abs() < 1e-5);
    }

    #[test]
    fn quality_metric_follows_loss_type() {
        let m = Metrics {
            accuracy: 0.8,
            loss: 0.3,
            log_loss: 0.4,
        };

        assert_eq!(m.quality_metric(LossType::CrossEntropy), 0.8);
        assert_eq!(m.quality_metric(LossType::LogLoss), 0.4);
        assert_eq!(m.quality_metric(LossType::WeightedLogLoss), 0.4);
    }

    #[test]
    fn accumulator_means_and_resets() {
        let mut acc = MetricsAccumulator::default();
        acc.add(&Metrics {
            accuracy: 1.,
            loss: 2.,
            log_loss: 3.,
        });
        acc.add(&Metrics {
            accuracy: 0.,
            loss: 4.,
            log_loss: 1.,
        });

        let mean = acc.take();
        assert_eq!(mean.accuracy, 0.5);
        assert_eq!(mean.loss, 3.);
        assert_eq!(mean.log_loss, 2.);
        assert_eq!(acc.batches(), 0);
        assert_eq!(acc.mean(), Metrics::default());
    }
}
