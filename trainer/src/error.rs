use std::{error::Error, fmt, io, path::PathBuf};

use machine_learning::MlErr;
use safetensors::SafeTensorError;

/// The trainer module's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Training and evaluation failures.
#[derive(Debug)]
pub enum TrainErr {
    Io(io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    Checkpoint(SafeTensorError),
    Ml(MlErr),
    MalformedPartition {
        what: &'static str,
        len: usize,
        batch_size: usize,
    },
    Diverged {
        id: usize,
        step: usize,
    },
    ProducerGone(String),
    InvalidConfig(String),
    MissingCheckpoint(PathBuf),
    CorruptCheckpoint {
        path: PathBuf,
        detail: String,
    },
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Csv(e) => write!(f, "csv error: {e}"),
            TrainErr::Json(e) => write!(f, "config error: {e}"),
            TrainErr::Checkpoint(e) => write!(f, "checkpoint error: {e}"),
            TrainErr::Ml(e) => write!(f, "{e}"),
            TrainErr::MalformedPartition {
                what,
                len,
                batch_size,
            } => write!(
                f,
                "malformed {what} partition: {len} samples for batches of {batch_size}"
            ),
            TrainErr::Diverged { id, step } => {
                write!(f, "net {id} diverged at step {step}: non finite objective")
            }
            TrainErr::ProducerGone(name) => write!(f, "batch producer {name} is gone"),
            TrainErr::InvalidConfig(detail) => write!(f, "invalid config: {detail}"),
            TrainErr::MissingCheckpoint(path) => {
                write!(f, "missing checkpoint {}", path.display())
            }
            TrainErr::CorruptCheckpoint { path, detail } => {
                write!(f, "corrupt checkpoint {}: {detail}", path.display())
            }
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Csv(e) => Some(e),
            TrainErr::Json(e) => Some(e),
            TrainErr::Checkpoint(e) => Some(e),
            TrainErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for TrainErr {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<SafeTensorError> for TrainErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Checkpoint(value)
    }
}

impl From<MlErr> for TrainErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrainErr> for io::Error {
    fn from(value: TrainErr) -> Self {
        match value {
            TrainErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
