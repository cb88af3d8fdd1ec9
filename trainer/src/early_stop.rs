use crate::config::LossType;

/// Which way a quality value improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Higher,
    Lower,
}

impl Direction {
    pub fn for_loss(loss_type: LossType) -> Self {
        match loss_type {
            LossType::CrossEntropy => Direction::Higher,
            LossType::LogLoss | LossType::WeightedLogLoss => Direction::Lower,
        }
    }

    /// Strict comparison; a NaN candidate never improves.
    #[inline]
    pub fn improves(self, candidate: f32, best: f32) -> bool {
        match self {
            Direction::Higher => candidate > best,
            Direction::Lower => candidate < best,
        }
    }
}

/// Outcome of one epoch's quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Improved,
    NotImproved { stalls: usize },
    Stop { stalls: usize },
}

/// Blends the validation and training metric into the value compared across epochs.
#[inline]
pub fn quality(val_weight: f32, val_metric: f32, train_metric: f32) -> f32 {
    val_weight * val_metric + (1. - val_weight) * train_metric
}

/// Tracks the best quality seen so far and the consecutive epochs without improvement.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    direction: Direction,
    best: f32,
    stalls: usize,
    max_stalls: usize,
}

impl EarlyStopping {
    /// Starts from an already measured `best`, usually the untrained model's quality.
    pub fn new(direction: Direction, best: f32, max_stalls: usize) -> Self {
        Self {
            direction,
            best,
            stalls: 0,
            max_stalls,
        }
    }

    #[inline]
    pub fn best(&self) -> f32 {
        self.best
    }

    #[inline]
    pub fn stalls(&self) -> usize {
        self.stalls
    }

    /// Records an epoch's quality. Stops once the stall counter goes past `max_stalls`.
    pub fn observe(&mut self, quality: f32) -> Verdict {
        if self.direction.improves(quality, self.best) {
            self.best = quality;
            self.stalls = 0;
            return Verdict::Improved;
        }

        self.stalls += 1;
        if self.stalls > self.max_stalls {
            Verdict::Stop {
                stalls: self.stalls,
            }
        } else {
            Verdict::NotImproved {
                stalls: self.stalls,
            }
        }
    }
}
