use std::sync::Arc;

use log::{error, info};
use machine_learning::ensemble::EnsembleScorer;
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::{
    Result,
    checkpoint::CheckpointStore,
    config::TrainingConfig,
    data::{Dataset, Labelling, Partition, SplitSpec},
    evaluate::evaluate_classifier,
    metrics::Metrics,
    report::{EnsembleSummary, ResultReporter, write_predictions},
    trainer::ClassifierTrainer,
};

/// Trains every configured classifier in turn. A failing classifier is logged and recorded,
/// and the next one still runs.
pub fn train_all(cfg: &TrainingConfig, dataset: Arc<Dataset>) -> Result<ResultReporter> {
    cfg.validate()?;
    dataset.check_labels(cfg.num_classes())?;
    let mut reporter = ResultReporter::new();

    for class in &cfg.classifiers {
        info!("start training net {}", class.id);

        let run = ClassifierTrainer::new(cfg, class, dataset.clone()).and_then(ClassifierTrainer::run);
        match run {
            Ok(summary) => {
                info!(
                    net = class.id;
                    "{:?} after {} steps, best epoch {}",
                    summary.outcome, summary.steps, summary.best_epoch
                );
                reporter.record(summary.result);
            }
            Err(e) => {
                error!("net {} failed: {e}", class.id);
                reporter.record_failure(class.id, &e);
            }
        }

        reporter.show();
    }

    Ok(reporter)
}

/// Restores every classifier, combines their votes and evaluates the ensemble on the shared
/// train and validation sets. Validation predictions are written to `cfg.result_path`.
pub fn test_all(cfg: &TrainingConfig, dataset: Arc<Dataset>) -> Result<ResultReporter> {
    cfg.validate()?;
    dataset.check_labels(cfg.num_classes())?;
    let store = CheckpointStore::new(&cfg.checkpoint_dir);
    let mut reporter = ResultReporter::new();

    let mut train_scores = Vec::with_capacity(cfg.num_classes());
    let mut val_scores = Vec::with_capacity(cfg.num_classes());

    info!("start testing");
    for class in &cfg.classifiers {
        let eval = evaluate_classifier(cfg, class, &dataset, &store)?;

        reporter.record(eval.result);
        train_scores.push(eval.train_scores);
        val_scores.push(eval.val_scores);
        reporter.show();
    }
    info!("finish testing");

    let scorer = EnsembleScorer::new(cfg.classifiers.iter().map(|c| c.reliability).collect())?;
    let train_probs = scorer.combine(stack(&train_scores)?.view())?;
    let val_probs = scorer.combine(stack(&val_scores)?.view())?;

    let split = SplitSpec::new(cfg.train_ratio, cfg.val_end_ratio);
    let total = dataset.len();
    let one_hot = Labelling::OneHot(cfg.num_classes());
    let train_set = Partition::new(dataset.clone(), split.train(total), one_hot)?;
    let val_set = Partition::new(dataset.clone(), split.validation(total), one_hot)?;

    let summary = EnsembleSummary {
        train: Metrics::of_probabilities(train_probs.view(), train_set.targets().view())?,
        val: Metrics::of_probabilities(val_probs.view(), val_set.targets().view())?,
    };
    reporter.set_ensemble(summary);
    reporter.show();

    write_predictions(&cfg.result_path, val_set.range().start, val_probs.view())?;
    Ok(reporter)
}

/// Stacks per-classifier score rows into a `[classes x samples]` matrix.
fn stack(rows: &[Array1<f32>]) -> Result<Array2<f32>> {
    let views: Vec<ArrayView1<f32>> = rows.iter().map(|r| r.view()).collect();
    Ok(ndarray::stack(Axis(0), &views).map_err(machine_learning::MlErr::from)?)
}
