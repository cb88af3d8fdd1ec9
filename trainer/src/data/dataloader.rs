use std::ops::Range;

use super::dataset::{Batch, Partition};

/// Walks a partition once, in order, producing owned batches. The last batch may be short.
#[derive(Debug, Clone)]
pub struct DataLoader {
    partition: Partition,
    batch_size: usize,
    cursor: usize,
}

impl DataLoader {
    pub fn new(partition: Partition, batch_size: usize) -> Self {
        Self {
            partition,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    #[inline]
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Amount of batches a full pass yields.
    #[inline]
    pub fn num_batches(&self) -> usize {
        self.partition.len().div_ceil(self.batch_size)
    }

    /// Returns the next batch, or None if exhausted.
    pub fn next_batch(&mut self) -> Option<Batch> {
        let range = self.next_range()?;
        Some(self.partition.slice(range))
    }

    fn next_range(&mut self) -> Option<Range<usize>> {
        if self.cursor >= self.partition.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.partition.len());
        let range = self.cursor..end;
        self.cursor = end;
        Some(range)
    }
}

impl Iterator for DataLoader {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}
