use std::thread::{self, JoinHandle};

use log::{debug, error};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::dataset::{Batch, Partition};
use crate::{Result, TrainErr};

/// Draws shuffled, full size batches from a partition on a dedicated producer thread.
///
/// The producer reshuffles the partition every time it is exhausted and keeps at most `depth`
/// batches in flight. Stopping closes the channel and joins the producer; it also happens on drop,
/// so every exit path of the owner releases the thread.
#[derive(Debug)]
pub struct Prefetcher {
    name: String,
    rx: Option<Receiver<Batch>>,
    handle: Option<JoinHandle<()>>,
}

impl Prefetcher {
    /// Spawns the producer thread.
    ///
    /// # Errors
    /// `MalformedPartition` if the partition is empty, `Io` if the thread cannot be spawned.
    pub fn spawn(
        name: impl Into<String>,
        partition: Partition,
        batch_size: usize,
        depth: usize,
        seed: u64,
    ) -> Result<Self> {
        let name = name.into();
        if partition.is_empty() || batch_size == 0 {
            return Err(TrainErr::MalformedPartition {
                what: "prefetched",
                len: partition.len(),
                batch_size,
            });
        }

        let (tx, rx) = mpsc::channel(depth.max(1));
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || produce(partition, batch_size, seed, tx))?;

        Ok(Self {
            name,
            rx: Some(rx),
            handle: Some(handle),
        })
    }

    /// Blocks until the next batch is ready.
    ///
    /// # Errors
    /// `ProducerGone` if the prefetcher was stopped or its producer died.
    pub fn next_batch(&mut self) -> Result<Batch> {
        self.rx
            .as_mut()
            .and_then(Receiver::blocking_recv)
            .ok_or_else(|| TrainErr::ProducerGone(self.name.clone()))
    }

    /// Closes the channel and joins the producer. Calling it more than once is a no-op.
    pub fn stop(&mut self) {
        drop(self.rx.take());

        let Some(handle) = self.handle.take() else {
            return;
        };

        match handle.join() {
            Ok(()) => debug!("prefetcher {} stopped", self.name),
            Err(_) => error!("prefetcher {} panicked, its batches were lost", self.name),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn produce(partition: Partition, batch_size: usize, seed: u64, tx: Sender<Batch>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..partition.len()).collect();
    let mut cursor = order.len();
    let mut indices = Vec::with_capacity(batch_size);

    loop {
        indices.clear();
        while indices.len() < batch_size {
            if cursor == order.len() {
                order.shuffle(&mut rng);
                cursor = 0;
            }

            let take = (batch_size - indices.len()).min(order.len() - cursor);
            indices.extend_from_slice(&order[cursor..cursor + take]);
            cursor += take;
        }

        if tx.blocking_send(partition.gather(&indices)).is_err() {
            return;
        }
    }
}
