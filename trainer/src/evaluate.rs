use std::sync::Arc;

use log::info;
use ndarray::Array1;

use crate::{
    Result,
    checkpoint::CheckpointStore,
    classifier::Classifier,
    config::{ClassifierConfig, TrainingConfig},
    data::{DataLoader, Dataset, Labelling, Partition, Prefetcher, SplitSpec},
    trainer::{NetResult, classifier_seed},
};

/// A restored classifier's metrics plus its positive probability for every sample of the
/// shared train and validation sets.
#[derive(Debug, Clone)]
pub struct ClassifierEvaluation {
    pub result: NetResult,
    pub train_scores: Array1<f32>,
    pub val_scores: Array1<f32>,
}

/// Restores classifier `class` from `store`, measures it on capped shuffled passes of its binary
/// partitions and scores every train and validation sample in order.
pub fn evaluate_classifier(
    cfg: &TrainingConfig,
    class: &ClassifierConfig,
    dataset: &Arc<Dataset>,
    store: &CheckpointStore,
) -> Result<ClassifierEvaluation> {
    let id = class.id;
    let seed = classifier_seed(cfg.seed, id);
    info!(net = id; "testing");

    let snapshot = store.load(id)?;
    let spec = cfg.network_for(dataset.width())?;
    let mut net = Classifier::restore(id, &spec, &snapshot, cfg.channels, seed)?;

    let split = SplitSpec::new(cfg.train_ratio, cfg.val_end_ratio);
    let total = dataset.len();
    let train = Partition::new(dataset.clone(), split.train(total), Labelling::Binary(id))?;
    let val = Partition::new(dataset.clone(), split.validation(total), Labelling::Binary(id))?;

    let capped = |p: &Partition| cfg.val_batch_cap.min(p.len().div_ceil(cfg.batch_size));
    let mut train_feed = Prefetcher::spawn(
        format!("net-{id}-train"),
        train.clone(),
        cfg.batch_size,
        cfg.prefetch_depth,
        seed.wrapping_add(1),
    )?;
    let mut val_feed = Prefetcher::spawn(
        format!("net-{id}-val"),
        val.clone(),
        cfg.batch_size,
        cfg.prefetch_depth,
        seed.wrapping_add(2),
    )?;

    let train_metrics = net.measure_feed(&mut train_feed, capped(&train))?;
    let val_metrics = net.measure_feed(&mut val_feed, capped(&val))?;
    train_feed.stop();
    val_feed.stop();

    let train_scores = net.win_probabilities(DataLoader::new(train, cfg.prob_batch_size))?;
    let val_scores = net.win_probabilities(DataLoader::new(val, cfg.prob_batch_size))?;

    Ok(ClassifierEvaluation {
        result: NetResult {
            id,
            train: train_metrics,
            val: val_metrics,
        },
        train_scores,
        val_scores,
    })
}
