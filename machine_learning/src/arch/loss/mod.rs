mod cross_entropy;
mod log_loss;
mod loss_fn;
mod softmax;

pub use cross_entropy::CrossEntropy;
pub use log_loss::{LogLoss, WeightedLogLoss};
pub use loss_fn::LossFn;
pub use softmax::{PROB_MAX, PROB_MIN, clamp_prob, softmax};
