pub mod dataloader;
pub mod dataset;
pub mod prefetch;
pub mod split;

pub use dataloader::DataLoader;
pub use dataset::{Batch, Dataset, Labelling, Partition};
pub use prefetch::Prefetcher;
pub use split::{SplitSpec, ratio_range};
