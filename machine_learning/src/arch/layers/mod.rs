mod dense;
mod dropout;
mod layer;
mod pool;

pub use dense::Dense;
pub use dropout::Dropout;
pub use layer::Layer;
pub use pool::Pool;
