use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    EmptyInput(&'static str),
    InvalidMomentum(f32),
    InvalidBatchSize(usize),
    StatsUninitialized,
    InvalidReliability {
        classifier: usize,
        weight: f32,
    },
    NonFiniteScore {
        classifier: usize,
        sample: usize,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "Invalid array shape: {e}"),
            MlErr::EmptyInput(what) => write!(f, "Received an empty {what}"),
            MlErr::InvalidMomentum(m) => {
                write!(f, "The momentum must be within [0, 1], got {m}")
            }
            MlErr::InvalidBatchSize(n) => write!(
                f,
                "The unbiased std correction needs a batch size of at least 2, got {n}"
            ),
            MlErr::StatsUninitialized => write!(
                f,
                "The running normalization stats were read before any training step seeded them"
            ),
            MlErr::InvalidReliability { classifier, weight } => write!(
                f,
                "The reliability weight of classifier {classifier} must be finite and within [0, 1), got {weight}"
            ),
            MlErr::NonFiniteScore { classifier, sample } => write!(
                f,
                "Classifier {classifier} produced a non finite score for sample {sample}"
            ),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
