pub mod arch;
pub mod ensemble;
pub mod error;
pub mod evaluation;
pub mod normalization;
pub mod optimization;

pub use error::{MlErr, Result};
