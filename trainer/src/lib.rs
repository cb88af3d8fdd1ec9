pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod data;
pub mod early_stop;
pub mod error;
pub mod evaluate;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod schedule;
pub mod trainer;

pub use config::{ClassifierConfig, LossType, OptimizerConfig, TrainingConfig};
pub use error::{Result, TrainErr};
pub use pipeline::{test_all, train_all};
pub use report::ResultReporter;
pub use trainer::{ClassifierTrainer, NetResult, Outcome, State, TrainSummary};
