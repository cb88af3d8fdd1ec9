pub mod activations;
pub mod layers;
pub mod loss;
mod sequential;
mod spec;

pub use sequential::{Pass, Sequential};
pub use spec::{LayerSpec, NetworkSpec, ParamInit, PoolKind};
