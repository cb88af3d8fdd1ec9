use machine_learning::{
    arch::{NetworkSpec, Pass, Sequential, loss::softmax},
    normalization::{NormStats, normalize},
};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    Result,
    checkpoint::TrainingSnapshot,
    data::{Batch, DataLoader, Prefetcher},
    metrics::{Metrics, MetricsAccumulator},
};

/// A binary one-vs-rest classifier: the network, its flat parameters and the normalization
/// statistics inference inputs go through.
#[derive(Debug, Clone)]
pub struct Classifier {
    id: usize,
    channels: usize,
    pub(crate) model: Sequential,
    pub(crate) params: Vec<f32>,
    pub(crate) stats: Option<NormStats>,
}

impl Classifier {
    /// Instantiates an untrained classifier from `spec`.
    pub fn fresh(id: usize, spec: &NetworkSpec, channels: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let params = spec.init_params(&mut rng)?;
        let model = Sequential::rebuild(spec, &params, seed)?;

        Ok(Self {
            id,
            channels,
            model,
            params,
            stats: None,
        })
    }

    /// Rebuilds the classifier described by `spec` around the parameters and statistics of a
    /// saved snapshot.
    pub fn restore(
        id: usize,
        spec: &NetworkSpec,
        snapshot: &TrainingSnapshot,
        channels: usize,
        seed: u64,
    ) -> Result<Self> {
        let model = Sequential::rebuild(spec, &snapshot.params, seed)?;

        Ok(Self {
            id,
            channels,
            model,
            params: snapshot.params.clone(),
            stats: snapshot.stats.clone(),
        })
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// The statistics inference inputs are normalized with; identity until some are published.
    pub fn inference_stats(&self) -> NormStats {
        self.stats
            .clone()
            .unwrap_or_else(|| NormStats::identity(self.channels))
    }

    pub fn snapshot(&self, epoch: usize, quality: f32) -> TrainingSnapshot {
        TrainingSnapshot {
            epoch,
            quality,
            params: self.params.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Normalizes `x` with the inference statistics and returns the output logits.
    pub fn logits(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let x = normalize(x, &self.inference_stats())?;
        Ok(self.model.forward(&self.params, x, Pass::Eval)?)
    }

    pub fn measure_batch(&mut self, batch: &Batch) -> Result<Metrics> {
        let logits = self.logits(batch.x.view())?;
        Metrics::of_logits(logits.view(), batch.y.view())
    }

    /// Mean metrics over one full, ordered pass of `loader`.
    pub fn measure(&mut self, loader: DataLoader) -> Result<Metrics> {
        let mut acc = MetricsAccumulator::default();
        for batch in loader {
            acc.add(&self.measure_batch(&batch)?);
        }

        Ok(acc.mean())
    }

    /// Mean metrics over `batches` shuffled batches drawn from `feed`.
    pub fn measure_feed(&mut self, feed: &mut Prefetcher, batches: usize) -> Result<Metrics> {
        let mut acc = MetricsAccumulator::default();
        for _ in 0..batches {
            let batch = feed.next_batch()?;
            acc.add(&self.measure_batch(&batch)?);
        }

        Ok(acc.mean())
    }

    /// The probability of the positive (`this class`) output for every sample of `loader`,
    /// in order.
    pub fn win_probabilities(&mut self, loader: DataLoader) -> Result<Array1<f32>> {
        let mut scores = Vec::with_capacity(DataLoader::partition(&loader).len());
        for batch in loader {
            let probs = softmax(self.logits(batch.x.view())?.view());
            scores.extend(probs.index_axis(Axis(1), 1).iter().copied());
        }

        Ok(Array1::from(scores))
    }
}
