use std::{num::NonZeroUsize, sync::Arc};

use log::{debug, info, warn};
use machine_learning::{
    arch::{
        NetworkSpec,
        loss::{CrossEntropy, LogLoss, LossFn, WeightedLogLoss},
    },
    normalization::{BatchStatsTracker, normalize},
    optimization::{Adam, ExponentialDecay, GradientDescent, Optimizer},
};

use crate::{
    Result, TrainErr,
    checkpoint::{CheckpointStore, TrainingSnapshot},
    classifier::Classifier,
    config::{ClassifierConfig, LossType, OptimizerConfig, TrainingConfig},
    data::{DataLoader, Dataset, Labelling, Partition, Prefetcher, SplitSpec},
    early_stop::{Direction, EarlyStopping, Verdict, quality},
    metrics::{Metrics, MetricsAccumulator},
    schedule::Schedule,
};

/// Where a classifier run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Training,
    Validating,
    Improved,
    NotImproved,
    Converged,
    EarlyStopped,
    Finalizing,
    Done,
}

/// How the epoch loop of a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Converged,
    EarlyStopped,
}

/// Train and validation metrics of one classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetResult {
    pub id: usize,
    pub train: Metrics,
    pub val: Metrics,
}

/// What a finished training run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub result: NetResult,
    pub outcome: Outcome,
    pub best_epoch: usize,
    pub steps: usize,
}

/// Builds the objective the network is trained on.
pub fn objective(loss_type: LossType, class: &ClassifierConfig) -> Box<dyn LossFn> {
    match loss_type {
        LossType::CrossEntropy => Box::new(CrossEntropy),
        LossType::LogLoss => Box::new(LogLoss),
        LossType::WeightedLogLoss => Box::new(WeightedLogLoss::new(
            class.correct_weight,
            class.incorrect_weight,
        )),
    }
}

fn optimizer(config: OptimizerConfig, len: usize) -> Box<dyn Optimizer> {
    match config {
        OptimizerConfig::GradientDescent => Box::new(GradientDescent::new()),
        OptimizerConfig::Adam {
            beta1,
            beta2,
            epsilon,
        } => Box::new(Adam::new(len, beta1, beta2, epsilon)),
    }
}

/// Seed of every random stream of classifier `id`, so runs are reproducible per id.
pub(crate) fn classifier_seed(base: u64, id: usize) -> u64 {
    base.wrapping_mul(0x9e37_79b9_7f4a_7c15).wrapping_add(id as u64)
}

/// Trains one binary classifier, from its untrained baseline to its best snapshot.
pub struct ClassifierTrainer<'a> {
    cfg: &'a TrainingConfig,
    class: &'a ClassifierConfig,
    spec: NetworkSpec,
    store: CheckpointStore,
    seed: u64,
    state: State,

    net: Classifier,
    grad: Vec<f32>,
    objective: Box<dyn LossFn>,
    optimizer: Box<dyn Optimizer>,
    lr: ExponentialDecay,
    l2_beta: f32,
    schedule: Schedule,
    tracker: BatchStatsTracker,

    train: Partition,
    val: Partition,
    train_feed: Prefetcher,
    val_feed: Prefetcher,

    stopping: EarlyStopping,
    best: TrainingSnapshot,
}

impl<'a> ClassifierTrainer<'a> {
    /// Prepares the run of classifier `class`: slices the dataset, builds the network, spawns the
    /// prefetchers and persists the untrained baseline as the first best snapshot.
    ///
    /// # Errors
    /// `MalformedPartition` if the validation partition is empty or the train one cannot fill a
    /// single batch.
    pub fn new(
        cfg: &'a TrainingConfig,
        class: &'a ClassifierConfig,
        dataset: Arc<Dataset>,
    ) -> Result<Self> {
        let id = class.id;
        let batch_size = cfg.batch_size;
        let seed = classifier_seed(cfg.seed, id);

        dataset.check_labels(cfg.num_classes())?;

        let split = SplitSpec::new(cfg.train_ratio, cfg.val_end_ratio);
        let total = dataset.len();
        let train = Partition::new(dataset.clone(), split.train(total), Labelling::Binary(id))?;
        let val = Partition::new(dataset.clone(), split.validation(total), Labelling::Binary(id))?;

        let iter_per_epoch = NonZeroUsize::new(train.len() / batch_size).ok_or(
            TrainErr::MalformedPartition {
                what: "train",
                len: train.len(),
                batch_size,
            },
        )?;
        if val.is_empty() {
            return Err(TrainErr::MalformedPartition {
                what: "validation",
                len: 0,
                batch_size,
            });
        }

        let spec = cfg.network_for(dataset.width())?;
        if dataset.width() % cfg.channels != 0 {
            return Err(TrainErr::InvalidConfig(format!(
                "{} features cannot be split in {} channels",
                dataset.width(),
                cfg.channels
            )));
        }

        let net = match &cfg.start_from {
            Some(dir) => {
                let start = CheckpointStore::new(dir).load(id)?;
                info!(net = id; "starting from {}", dir.display());
                Classifier::restore(id, &spec, &start, cfg.channels, seed)?
            }
            None => Classifier::fresh(id, &spec, cfg.channels, seed)?,
        };

        let show_every = NonZeroUsize::new(cfg.show_progress_frequency)
            .ok_or_else(|| TrainErr::InvalidConfig("show_progress_frequency is 0".into()))?;
        let schedule = Schedule::new(iter_per_epoch, cfg.epochs, show_every);

        let (base_lr, decay_rate, l2_beta) = class.hyperparams(cfg.loss_type);
        let lr = ExponentialDecay::new(base_lr, decay_rate, schedule.total_steps());

        let train_feed = Prefetcher::spawn(
            format!("net-{id}-train"),
            train.clone(),
            batch_size,
            cfg.prefetch_depth,
            seed.wrapping_add(1),
        )?;
        let val_feed = Prefetcher::spawn(
            format!("net-{id}-val"),
            val.clone(),
            batch_size,
            cfg.prefetch_depth,
            seed.wrapping_add(2),
        )?;

        let mut trainer = Self {
            cfg,
            class,
            store: CheckpointStore::new(&cfg.checkpoint_dir),
            seed,
            state: State::Init,
            grad: vec![0.; net.params().len()],
            objective: objective(cfg.loss_type, class),
            optimizer: optimizer(cfg.optimizer, net.params().len()),
            lr,
            l2_beta,
            schedule,
            tracker: BatchStatsTracker::new(cfg.channels, cfg.momentum)?,
            train,
            val,
            train_feed,
            val_feed,
            stopping: EarlyStopping::new(Direction::for_loss(cfg.loss_type), 0., cfg.max_stalls),
            best: net.snapshot(0, 0.),
            net,
            spec,
        };

        trainer.seed_baseline()?;
        Ok(trainer)
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.class.id
    }

    #[inline]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    #[inline]
    pub fn best(&self) -> &TrainingSnapshot {
        &self.best
    }

    /// Runs every epoch until convergence or early stop, then restores the best snapshot and
    /// measures it over the full train and validation partitions.
    ///
    /// # Errors
    /// `Diverged` when the objective stops being finite; the last persisted snapshot is kept.
    pub fn run(mut self) -> Result<TrainSummary> {
        let id = self.id();
        let total = self.schedule.total_steps();
        let iter_per_epoch = self.schedule.iter_per_epoch.get();
        info!(net = id; "training {total} steps, {iter_per_epoch} per epoch");

        let mut acc = MetricsAccumulator::default();
        let mut outcome = Outcome::Converged;
        let mut steps = 0;

        self.transition(State::Training);
        for step in 0..total {
            if self.schedule.should_show(step) {
                let (epoch_pct, total_pct) = self.schedule.progress(step);
                debug!(
                    "net: {id}  step: {step} ({iter_per_epoch}|{epoch_pct:.2}%) / {total}|{total_pct:.2}%"
                );
            }

            acc.add(&self.step(step)?);
            steps += 1;

            if !self.schedule.ends_epoch(step) {
                continue;
            }

            let epoch = self.schedule.epoch_of(step);
            if let Verdict::Stop { stalls } = self.end_epoch(epoch, acc.take())? {
                info!(net = id; "early stop at epoch {epoch} after {stalls} epochs without improvement");
                outcome = Outcome::EarlyStopped;
                break;
            }

            self.transition(State::Training);
        }

        self.transition(match outcome {
            Outcome::Converged => State::Converged,
            Outcome::EarlyStopped => State::EarlyStopped,
        });

        let result = self.finalize()?;
        self.transition(State::Done);
        info!(net = id; "finished training");

        Ok(TrainSummary {
            result,
            outcome,
            best_epoch: self.best.epoch,
            steps,
        })
    }

    /// Measures the untrained network over the whole validation partition and persists it as
    /// the first best snapshot.
    fn seed_baseline(&mut self) -> Result<()> {
        let val = self
            .net
            .measure(DataLoader::new(self.val.clone(), self.cfg.batch_size))?;
        let baseline = val.quality_metric(self.cfg.loss_type);

        info!(
            net = self.id();
            "untrained val_loss: {:.6}  val_log_loss: {:.6}  val_accuracy: {:.6}",
            val.loss, val.log_loss, val.accuracy
        );

        self.stopping = EarlyStopping::new(
            Direction::for_loss(self.cfg.loss_type),
            baseline,
            self.cfg.max_stalls,
        );
        self.best = self.net.snapshot(0, baseline);
        self.store.save(self.id(), &self.best)
    }

    /// One optimizer step over a freshly drawn batch.
    fn step(&mut self, step: usize) -> Result<Metrics> {
        let batch = self.train_feed.next_batch()?;

        let stats = self.tracker.update(batch.x.view())?;
        let x = normalize(batch.x.view(), &stats)?;

        let (logits, loss) = self.net.model.backprop(
            &self.net.params,
            &mut self.grad,
            x,
            batch.y.view(),
            self.objective.as_ref(),
            self.l2_beta,
            self.cfg.keep_prob,
        )?;

        if !loss.is_finite() {
            return Err(TrainErr::Diverged { id: self.id(), step });
        }

        let lr = self.lr.learning_rate(step);
        self.optimizer
            .update_params(lr, &mut self.net.params, &self.grad)?;

        Metrics::of_logits(logits.view(), batch.y.view())
    }

    /// Publishes the inference statistics, validates and decides whether the epoch improved.
    fn end_epoch(&mut self, epoch: usize, train: Metrics) -> Result<Verdict> {
        let id = self.id();
        self.net.stats = Some(self.tracker.inference_stats(self.cfg.batch_size)?);

        self.transition(State::Validating);
        let batches = self
            .cfg
            .val_batch_cap
            .min(self.val.len().div_ceil(self.cfg.batch_size));
        let val = self.net.measure_feed(&mut self.val_feed, batches)?;

        let loss_type = self.cfg.loss_type;
        let quality = quality(
            self.cfg.val_weight,
            val.quality_metric(loss_type),
            train.quality_metric(loss_type),
        );

        let line = format!(
            "net: {id}  epoch: {epoch}  train_loss: {:.6}  train_log_loss: {:.6}  train_accuracy: {:.6}  \
             val_loss: {:.6}  val_log_loss: {:.6}  val_accuracy: {:.6}",
            train.loss, train.log_loss, train.accuracy, val.loss, val.log_loss, val.accuracy
        );

        let verdict = self.stopping.observe(quality);
        match verdict {
            Verdict::Improved => {
                self.transition(State::Improved);
                info!("{line}  best");

                self.best = self.net.snapshot(epoch, quality);
                self.store.save(id, &self.best)?;
            }
            Verdict::NotImproved { stalls } | Verdict::Stop { stalls } => {
                self.transition(State::NotImproved);
                info!("{line}  incr_times: {stalls}");
            }
        }

        Ok(verdict)
    }

    /// Restores the best snapshot and measures it without a batch cap.
    fn finalize(&mut self) -> Result<NetResult> {
        self.transition(State::Finalizing);
        self.train_feed.stop();
        self.val_feed.stop();

        self.net = Classifier::restore(self.id(), &self.spec, &self.best, self.cfg.channels, self.seed)?;

        let batch_size = self.cfg.batch_size;
        let train = self.net.measure(DataLoader::new(self.train.clone(), batch_size))?;
        let val = self.net.measure(DataLoader::new(self.val.clone(), batch_size))?;

        if self.best.epoch == 0 {
            warn!(net = self.id(); "no epoch improved over the untrained baseline");
        }

        Ok(NetResult {
            id: self.id(),
            train,
            val,
        })
    }

    fn transition(&mut self, next: State) {
        debug!(net = self.id(); "{:?} -> {next:?}", self.state);
        self.state = next;
    }
}
