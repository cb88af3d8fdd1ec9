use std::{fs, path::Path};

use log::{info, warn};
use machine_learning::evaluation::argmax;
use ndarray::{ArrayView2, Axis};

use crate::{Result, TrainErr, metrics::Metrics, trainer::NetResult};

/// Accuracy and log-loss of the combined ensemble over both shared sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleSummary {
    pub train: Metrics,
    pub val: Metrics,
}

/// Collects per-classifier results and the ensemble summary, and prints them.
#[derive(Debug, Default)]
pub struct ResultReporter {
    results: Vec<NetResult>,
    failures: Vec<(usize, String)>,
    ensemble: Option<EnsembleSummary>,
}

impl ResultReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: NetResult) {
        self.results.push(result);
    }

    pub fn record_failure(&mut self, id: usize, err: &TrainErr) {
        self.failures.push((id, err.to_string()));
    }

    pub fn set_ensemble(&mut self, summary: EnsembleSummary) {
        self.ensemble = Some(summary);
    }

    #[inline]
    pub fn results(&self) -> &[NetResult] {
        &self.results
    }

    #[inline]
    pub fn failures(&self) -> &[(usize, String)] {
        &self.failures
    }

    #[inline]
    pub fn ensemble(&self) -> Option<&EnsembleSummary> {
        self.ensemble.as_ref()
    }

    /// Logs every recorded result, failures and the ensemble summary if present.
    pub fn show(&self) {
        for r in &self.results {
            info!("*************************************************");
            info!(
                "net: {}  train_accuracy: {:.6}  train_loss: {:.6}  train_log_loss: {:.6}",
                r.id, r.train.accuracy, r.train.loss, r.train.log_loss
            );
            info!(
                "net: {}  val_accuracy: {:.6}  val_loss: {:.6}  val_log_loss: {:.6}",
                r.id, r.val.accuracy, r.val.loss, r.val.log_loss
            );
            info!("*********************************");
        }

        for (id, err) in &self.failures {
            warn!("net: {id}  failed: {err}");
        }

        if let Some(e) = &self.ensemble {
            info!("****************************************");
            info!(
                "train_accuracy: {:.6} train_log_loss: {:.8}",
                e.train.accuracy, e.train.log_loss
            );
            info!(
                "val_accuracy: {:.6} val_log_loss: {:.8}",
                e.val.accuracy, e.val.log_loss
            );
        }
    }
}

/// Writes one row per sample: its absolute index, the predicted class and every class
/// probability. `first_sample` is the dataset index of the first row of `probs`.
pub fn write_predictions<P: AsRef<Path>>(
    path: P,
    first_sample: usize,
    probs: ArrayView2<f32>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut w = csv::Writer::from_path(path)?;

    let mut header = vec!["sample".to_string(), "prediction".to_string()];
    header.extend((0..probs.ncols()).map(|k| format!("prob_{k}")));
    w.write_record(&header)?;

    for (i, row) in probs.axis_iter(Axis(0)).enumerate() {
        let mut record = vec![(first_sample + i).to_string(), argmax(row).to_string()];
        record.extend(row.iter().map(|p| format!("{p:.6}")));
        w.write_record(&record)?;
    }

    w.flush()?;
    info!("wrote {} predictions to {}", probs.nrows(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn predictions_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result").join("test_B.csv");

        let probs = array![[0.2, 0.5, 0.3], [0.7, 0.1, 0.2]];
        write_predictions(&path, 10, probs.view()).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, ["sample", "prediction", "prob_0", "prob_1", "prob_2"]);

        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "10");
        assert_eq!(&rows[0][1], "1");
        assert_eq!(&rows[1][0], "11");
        assert_eq!(&rows[1][1], "0");
        assert_eq!(&rows[1][2], "0.700000");
    }

    #[test]
    fn reporter_keeps_results_and_failures() {
        let mut reporter = ResultReporter::new();
        reporter.record(NetResult {
            id: 0,
            train: Metrics::default(),
            val: Metrics::default(),
        });
        reporter.record_failure(1, &TrainErr::Diverged { id: 1, step: 4 });

        assert_eq!(reporter.results().len(), 1);
        assert_eq!(reporter.failures()[0].0, 1);
        assert!(reporter.failures()[0].1.contains("diverged"));
        assert!(reporter.ensemble().is_none());

        reporter.show();
    }
}
