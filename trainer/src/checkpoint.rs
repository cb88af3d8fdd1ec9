use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use machine_learning::normalization::NormStats;
use ndarray::Array1;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{Result, TrainErr};

const PARAMS: &str = "params";
const RUNNING_MEAN: &str = "running_mean";
const RUNNING_STD: &str = "running_std";
const EPOCH: &str = "epoch";
const QUALITY: &str = "quality";

/// Everything needed to resume inference with a classifier at its best point.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSnapshot {
    pub epoch: usize,
    pub quality: f32,
    pub params: Vec<f32>,
    /// `None` until the first epoch publishes inference statistics.
    pub stats: Option<NormStats>,
}

/// Persists one snapshot per classifier as `<dir>/net_<id>.safetensors`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, id: usize) -> PathBuf {
        self.dir.join(format!("net_{id}.safetensors"))
    }

    #[inline]
    pub fn exists(&self, id: usize) -> bool {
        self.path(id).is_file()
    }

    /// Writes the snapshot of classifier `id`, replacing any previous one.
    pub fn save(&self, id: usize, snapshot: &TrainingSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let params: &[u8] = bytemuck::cast_slice(&snapshot.params);
        let mut tensors = HashMap::new();
        tensors.insert(
            PARAMS.to_string(),
            TensorView::new(Dtype::F32, vec![snapshot.params.len()], params)?,
        );

        let stats = snapshot
            .stats
            .as_ref()
            .map(|s| (s.mean.to_vec(), s.std.to_vec()));
        if let Some((mean, std)) = &stats {
            tensors.insert(
                RUNNING_MEAN.to_string(),
                TensorView::new(Dtype::F32, vec![mean.len()], bytemuck::cast_slice(mean))?,
            );
            tensors.insert(
                RUNNING_STD.to_string(),
                TensorView::new(Dtype::F32, vec![std.len()], bytemuck::cast_slice(std))?,
            );
        }

        let metadata = HashMap::from([
            (EPOCH.to_string(), snapshot.epoch.to_string()),
            (QUALITY.to_string(), snapshot.quality.to_string()),
        ]);

        let bytes = safetensors::serialize(&tensors, &Some(metadata))?;
        let path = self.path(id);
        fs::write(&path, bytes)?;

        debug!(net = id, epoch = snapshot.epoch; "saved checkpoint {}", path.display());
        Ok(())
    }

    /// Reads back the snapshot of classifier `id`.
    ///
    /// # Errors
    /// `MissingCheckpoint` if it was never saved, `CorruptCheckpoint` if it lacks a tensor or
    /// a metadata entry.
    pub fn load(&self, id: usize) -> Result<TrainingSnapshot> {
        let path = self.path(id);
        if !path.is_file() {
            return Err(TrainErr::MissingCheckpoint(path));
        }

        let bytes = fs::read(&path)?;
        let corrupt = |detail: String| TrainErr::CorruptCheckpoint {
            path: path.clone(),
            detail,
        };

        let (_, header) = SafeTensors::read_metadata(&bytes)?;
        let metadata = header.metadata().clone().unwrap_or_default();
        let entry = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| corrupt(format!("missing metadata {key}")))
        };

        let epoch = entry(EPOCH)?
            .parse()
            .map_err(|e| corrupt(format!("bad epoch: {e}")))?;
        let quality = entry(QUALITY)?
            .parse()
            .map_err(|e| corrupt(format!("bad quality: {e}")))?;

        let tensors = SafeTensors::deserialize(&bytes)?;
        let read = |name: &str| -> Result<Vec<f32>> {
            let view = tensors.tensor(name)?;
            if view.dtype() != Dtype::F32 {
                return Err(corrupt(format!("{name} is {:?}, expected F32", view.dtype())));
            }

            Ok(view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect())
        };

        let params = read(PARAMS)?;
        let names = tensors.names();
        let stats = if names.iter().any(|n| n.as_str() == RUNNING_MEAN) {
            Some(NormStats {
                mean: Array1::from(read(RUNNING_MEAN)?),
                std: Array1::from(read(RUNNING_STD)?),
            })
        } else {
            None
        };

        Ok(TrainingSnapshot {
            epoch,
            quality,
            params,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested"));

        let snapshot = TrainingSnapshot {
            epoch: 7,
            quality: 0.25,
            params: vec![0.5, -1.25, 3.0],
            stats: Some(NormStats {
                mean: array![0.1, 0.2, 0.3],
                std: array![1.0, 2.0, 0.5],
            }),
        };

        store.save(3, &snapshot).unwrap();
        assert!(store.exists(3));
        assert!(store.path(3).ends_with("net_3.safetensors"));
        assert_eq!(store.load(3).unwrap(), snapshot);
    }

    #[test]
    fn snapshot_without_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let snapshot = TrainingSnapshot {
            epoch: 0,
            quality: 0.69,
            params: vec![1.0; 4],
            stats: None,
        };

        store.save(0, &snapshot).unwrap();
        assert_eq!(store.load(0).unwrap(), snapshot);
    }

    #[test]
    fn latest_save_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let mut snapshot = TrainingSnapshot {
            epoch: 1,
            quality: 0.5,
            params: vec![1.0],
            stats: None,
        };
        store.save(2, &snapshot).unwrap();

        snapshot.epoch = 2;
        snapshot.params = vec![2.0];
        store.save(2, &snapshot).unwrap();

        assert_eq!(store.load(2).unwrap().params, vec![2.0]);
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        assert!(matches!(store.load(5), Err(TrainErr::MissingCheckpoint(_))));
    }
}
