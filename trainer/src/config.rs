use std::{fs, path::Path, path::PathBuf};

use machine_learning::{arch::NetworkSpec, normalization::MOMENTUM};
use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr};

pub const NUM_CLASSES: usize = 30;

const BASE_LEARNING_RATE: [f32; NUM_CLASSES] = [
    5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 3e-5, 5e-5, 5e-5, 5e-5, //
    5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, //
    5e-5, 5e-5, 5e-5, 5e-5, 1e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5,
];

const DECAY_RATE: [f32; NUM_CLASSES] = [
    1e-4, 1e-4, 5e-5, 6e-5, 6e-5, 6e-5, 5e-5, 5e-5, 1e-4, 1e-4, //
    1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 6e-5, 1e-4, //
    1e-4, 1e-4, 7e-5, 1e-4, 5e-5, 1e-4, 1e-4, 1e-4, 8e-5, 8e-5,
];

const REGULAR_BETA: [f32; NUM_CLASSES] = [
    0.1, 0.1, 0.3, 0.1, 0.1, 0.1, 0.03, 0.2, 0.15, 0.2, //
    0.1, 0.1, 0.01, 0.1, 0.1, 0.15, 0.1, 0.03, 0.03, 0.01, //
    0.1, 0.1, 0.01, 0.03, 0.02, 0.3, 0.5, 0.2, 0.01, 0.04,
];

const BASE_LEARNING_RATE_LOG_LOSS: [f32; NUM_CLASSES] = [
    5e-7, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, //
    5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 1e-4, 5e-5, 5e-5, 5e-5, 5e-8, //
    5e-5, 5e-5, 5e-8, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5, 5e-5,
];

const DECAY_RATE_LOG_LOSS: [f32; NUM_CLASSES] = [
    1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, //
    1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, //
    1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 1e-4, 5e-5, 5e-5,
];

const REGULAR_BETA_LOG_LOSS: [f32; NUM_CLASSES] = [
    0.01, 0.01, 0.3, 0.01, 0.01, 0.01, 0.03, 0.2, 0.15, 0.2, //
    0.01, 0.01, 0.1, 0.01, 0.01, 0.15, 0.01, 0.03, 0.03, 0.01, //
    0.01, 0.01, 0.01, 0.03, 0.02, 0.3, 0.5, 0.2, 0.01, 0.04,
];

/// Validation accuracy each classifier reached in an earlier run, used as its vote weight.
const RELIABILITY: [f32; NUM_CLASSES] = [
    0.972826, 0.904762, 0.591146, 0.899740, 0.880319, 0.805990, 0.709635, 0.772135, 0.845052,
    0.861979, 0.860677, 0.807292, 0.940104, 0.797965, 0.894531, 0.803191, 0.819010, 0.889323,
    0.909896, 0.959239, 0.847826, 0.921875, 0.960938, 0.886719, 0.500000, 0.593750, 0.638021,
    0.641927, 0.929167, 0.864583,
];

const CORRECT_WEIGHT: f32 = 0.9;

const INCORRECT_WEIGHT: [f32; NUM_CLASSES] = [
    1.3, 1.3, 1.1, 1.3, 1.3, 1.3, 1.3, 1.2, 1.3, 1.3, //
    1.1, 1.3, 1.2, 1.3, 1.3, 1.3, 1.3, 1.2, 1.3, 1.3, //
    1.3, 1.3, 1.2, 1.3, 1.3, 1.3, 1.3, 1.2, 1.3, 1.3,
];

/// The objective a classifier is trained on. It also decides which metric drives early stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    CrossEntropy,
    LogLoss,
    WeightedLogLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    GradientDescent,
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

/// Hyperparameters of a single one-vs-rest classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub id: usize,
    pub learning_rate: f32,
    pub decay_rate: f32,
    pub regular_beta: f32,
    pub learning_rate_log_loss: f32,
    pub decay_rate_log_loss: f32,
    pub regular_beta_log_loss: f32,
    pub reliability: f32,
    pub correct_weight: f32,
    pub incorrect_weight: f32,
}

impl ClassifierConfig {
    /// Returns the `(learning rate, decay rate, l2 beta)` triple matching `loss_type`.
    pub fn hyperparams(&self, loss_type: LossType) -> (f32, f32, f32) {
        match loss_type {
            LossType::CrossEntropy => (self.learning_rate, self.decay_rate, self.regular_beta),
            LossType::LogLoss | LossType::WeightedLogLoss => (
                self.learning_rate_log_loss,
                self.decay_rate_log_loss,
                self.regular_beta_log_loss,
            ),
        }
    }

    /// The tuned table of the 30 classifiers.
    pub fn defaults() -> Vec<Self> {
        (0..NUM_CLASSES)
            .map(|id| Self {
                id,
                learning_rate: BASE_LEARNING_RATE[id],
                decay_rate: DECAY_RATE[id],
                regular_beta: REGULAR_BETA[id],
                learning_rate_log_loss: BASE_LEARNING_RATE_LOG_LOSS[id],
                decay_rate_log_loss: DECAY_RATE_LOG_LOSS[id],
                regular_beta_log_loss: REGULAR_BETA_LOG_LOSS[id],
                reliability: RELIABILITY[id],
                correct_weight: CORRECT_WEIGHT,
                incorrect_weight: INCORRECT_WEIGHT[id],
            })
            .collect()
    }
}

/// Run wide configuration. Every field has a default, so a JSON file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub epochs: usize,
    pub channels: usize,
    pub train_ratio: f32,
    pub val_end_ratio: f32,
    pub val_weight: f32,
    pub max_stalls: usize,
    pub keep_prob: f32,
    pub momentum: f32,
    pub val_batch_cap: usize,
    pub prob_batch_size: usize,
    pub show_progress_frequency: usize,
    pub prefetch_depth: usize,
    pub loss_type: LossType,
    pub optimizer: OptimizerConfig,
    pub seed: u64,
    pub network: Option<NetworkSpec>,
    pub checkpoint_dir: PathBuf,
    pub start_from: Option<PathBuf>,
    pub result_path: PathBuf,
    pub classifiers: Vec<ClassifierConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            epochs: 80,
            channels: 3,
            train_ratio: 0.01,
            val_end_ratio: 0.02,
            val_weight: 0.7,
            max_stalls: 15,
            keep_prob: 0.5,
            momentum: MOMENTUM,
            val_batch_cap: 100,
            prob_batch_size: 100,
            show_progress_frequency: 2,
            prefetch_depth: 8,
            loss_type: LossType::LogLoss,
            optimizer: OptimizerConfig::Adam {
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
            },
            seed: 42,
            network: None,
            checkpoint_dir: PathBuf::from("model/bi_net"),
            start_from: None,
            result_path: PathBuf::from("result/test_B.csv"),
            classifiers: ClassifierConfig::defaults(),
        }
    }
}

impl TrainingConfig {
    /// Reads a JSON config, filling every missing field with its default.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the network every classifier is built from, falling back to the default head
    /// over `input_dim` features.
    pub fn network_for(&self, input_dim: usize) -> Result<NetworkSpec> {
        let spec = match &self.network {
            Some(spec) if spec.input_dim != input_dim => {
                return Err(TrainErr::InvalidConfig(format!(
                    "network expects {} features but the dataset has {input_dim}",
                    spec.input_dim
                )));
            }
            Some(spec) => spec.clone(),
            None => NetworkSpec::default_head(input_dim),
        };

        let out = spec.validate()?;
        if out != 2 {
            return Err(TrainErr::InvalidConfig(format!(
                "network must output 2 logits, got {out}"
            )));
        }

        Ok(spec)
    }

    /// Checks the cross field invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: &str| Err(TrainErr::InvalidConfig(detail.to_string()));

        if self.batch_size < 2 {
            return invalid("batch_size must be at least 2");
        }
        if self.channels == 0 || self.prob_batch_size == 0 || self.prefetch_depth == 0 {
            return invalid("channels, prob_batch_size and prefetch_depth must be positive");
        }
        if self.show_progress_frequency == 0 || self.val_batch_cap == 0 {
            return invalid("show_progress_frequency and val_batch_cap must be positive");
        }
        if !(0. ..self.val_end_ratio).contains(&self.train_ratio) || self.val_end_ratio > 1. {
            return invalid("ratios must satisfy 0 <= train_ratio < val_end_ratio <= 1");
        }
        if !(0. ..=1.).contains(&self.val_weight) {
            return invalid("val_weight must be in [0, 1]");
        }
        if !(self.keep_prob > 0. && self.keep_prob <= 1.) {
            return invalid("keep_prob must be in (0, 1]");
        }
        if self.classifiers.is_empty() {
            return invalid("at least one classifier is required");
        }
        if let Some((pos, c)) = self
            .classifiers
            .iter()
            .enumerate()
            .find(|(pos, c)| c.id != *pos)
        {
            return Err(TrainErr::InvalidConfig(format!(
                "classifier at position {pos} has id {}",
                c.id
            )));
        }

        Ok(())
    }

    /// Number of classes of the ensemble, one per classifier.
    pub fn num_classes(&self) -> usize {
        self.classifiers.len()
    }
}
