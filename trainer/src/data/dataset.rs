use std::{ops::Range, path::Path, sync::Arc};

use ndarray::Array2;

use crate::{Result, TrainErr};

/// An in-memory labelled dataset: one row of `width` features per sample plus its class id.
#[derive(Debug, Clone)]
pub struct Dataset {
    width: usize,
    features: Vec<f32>,
    labels: Vec<usize>,
}

impl Dataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Errors
    /// `InvalidConfig` if the buffers disagree on the amount of samples or the dataset is empty.
    pub fn new(width: usize, features: Vec<f32>, labels: Vec<usize>) -> Result<Self> {
        if width == 0 || labels.is_empty() {
            return Err(TrainErr::InvalidConfig("dataset must be non-empty".into()));
        }
        if features.len() != width * labels.len() {
            return Err(TrainErr::InvalidConfig(format!(
                "{} features do not fill {} rows of width {width}",
                features.len(),
                labels.len()
            )));
        }

        Ok(Self {
            width,
            features,
            labels,
        })
    }

    /// Loads a headerless csv where every record is `label,f0,f1,...`.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut width = None;
        let mut features = Vec::new();
        let mut labels = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let malformed = |detail: String| TrainErr::InvalidConfig(format!("row {row}: {detail}"));

            let mut fields = record.iter();
            let label = fields
                .next()
                .ok_or_else(|| malformed("missing label".into()))?
                .parse()
                .map_err(|e| malformed(format!("bad label: {e}")))?;

            let before = features.len();
            for field in fields {
                let value: f32 = field
                    .parse()
                    .map_err(|e| malformed(format!("bad feature {field:?}: {e}")))?;
                features.push(value);
            }

            let got = features.len() - before;
            match width {
                None => width = Some(got),
                Some(w) if w != got => {
                    return Err(malformed(format!("expected {w} features, got {got}")));
                }
                Some(_) => {}
            }

            labels.push(label);
        }

        Self::new(width.unwrap_or(0), features, labels)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Returns the feature row of sample `idx` (panics if out of bounds).
    #[inline]
    pub fn row(&self, idx: usize) -> &[f32] {
        &self.features[idx * self.width..(idx + 1) * self.width]
    }

    /// Checks that every label names one of `num_classes` classes.
    ///
    /// # Errors
    /// `InvalidConfig` naming the first out of range sample.
    pub fn check_labels(&self, num_classes: usize) -> Result<()> {
        match self.labels.iter().position(|&label| label >= num_classes) {
            Some(row) => Err(TrainErr::InvalidConfig(format!(
                "row {row}: label {} is not one of the {num_classes} classes",
                self.labels[row]
            ))),
            None => Ok(()),
        }
    }
}

/// How the class id of a sample is turned into a target vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Labelling {
    /// `[0, 1]` when the sample belongs to the class, `[1, 0]` otherwise.
    Binary(usize),
    /// One-hot vector over every class.
    OneHot(usize),
}

impl Labelling {
    pub fn width(&self) -> usize {
        match self {
            Labelling::Binary(_) => 2,
            Labelling::OneHot(classes) => *classes,
        }
    }

    fn target(&self, label: usize) -> usize {
        match self {
            Labelling::Binary(class) => usize::from(label == *class),
            Labelling::OneHot(_) => label,
        }
    }
}

/// A minimal owned batch of training data.
#[derive(Debug, Clone)]
pub struct Batch {
    pub x: Array2<f32>,
    pub y: Array2<f32>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }
}

/// A contiguous slice of a shared dataset together with the labelling used for it.
#[derive(Debug, Clone)]
pub struct Partition {
    dataset: Arc<Dataset>,
    range: Range<usize>,
    labelling: Labelling,
}

impl Partition {
    /// Creates a partition over `range`, clamped to the dataset.
    ///
    /// # Errors
    /// `InvalidConfig` if a one-hot labelling is too narrow for a label in `range`.
    pub fn new(dataset: Arc<Dataset>, range: Range<usize>, labelling: Labelling) -> Result<Self> {
        let end = range.end.min(dataset.len());
        let start = range.start.min(end);

        if let Labelling::OneHot(classes) = labelling {
            if let Some(i) = dataset.labels[start..end].iter().position(|&l| l >= classes) {
                return Err(TrainErr::InvalidConfig(format!(
                    "row {}: label {} is not one of the {classes} classes",
                    start + i,
                    dataset.labels[start + i]
                )));
            }
        }

        Ok(Self {
            dataset,
            range: start..end,
            labelling,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Copies the samples at the partition relative `indices` into an owned batch.
    pub fn gather(&self, indices: &[usize]) -> Batch {
        let width = self.dataset.width();
        let mut x = Array2::zeros((indices.len(), width));
        let mut y = Array2::zeros((indices.len(), self.labelling.width()));

        for (row, &i) in indices.iter().enumerate() {
            let idx = self.range.start + i;
            x.row_mut(row)
                .iter_mut()
                .zip(self.dataset.row(idx))
                .for_each(|(dst, src)| *dst = *src);

            let target = self.labelling.target(self.dataset.labels()[idx]);
            y[[row, target]] = 1.;
        }

        Batch { x, y }
    }

    /// Copies the contiguous partition relative `range` into an owned batch.
    pub fn slice(&self, range: Range<usize>) -> Batch {
        let indices: Vec<_> = range.collect();
        self.gather(&indices)
    }

    /// The targets of every sample in the partition, one row each.
    pub fn targets(&self) -> Array2<f32> {
        self.slice(0..self.len()).y
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn tiny() -> Arc<Dataset> {
        let features = (0..12).map(|v| v as f32).collect();
        Arc::new(Dataset::new(2, features, vec![0, 1, 2, 1, 0, 2]).unwrap())
    }

    #[test]
    fn dataset_rejects_ragged_buffers() {
        assert!(Dataset::new(3, vec![0.; 4], vec![0, 1]).is_err());
        assert!(Dataset::new(2, vec![], vec![]).is_err());
    }

    #[test]
    fn labels_outside_the_class_count_are_rejected() {
        let ds = tiny();
        assert!(ds.check_labels(3).is_ok());

        let err = ds.check_labels(2).unwrap_err();
        assert!(matches!(err, TrainErr::InvalidConfig(msg) if msg.starts_with("row 2:")));

        assert!(Partition::new(ds.clone(), 0..2, Labelling::OneHot(2)).is_ok());
        assert!(Partition::new(ds, 0..6, Labelling::OneHot(2)).is_err());
    }

    #[test]
    fn binary_labelling_marks_only_the_class() {
        let part = Partition::new(tiny(), 0..6, Labelling::Binary(1)).unwrap();
        let y = part.targets();

        assert_eq!(y.shape(), &[6, 2]);
        for (row, label) in [0, 1, 2, 1, 0, 2].into_iter().enumerate() {
            let expected = if label == 1 { [0., 1.] } else { [1., 0.] };
            assert_eq!(y.row(row).to_vec(), expected);
        }
    }

    #[test]
    fn one_hot_labelling_spans_every_class() {
        let part = Partition::new(tiny(), 2..5, Labelling::OneHot(3)).unwrap();
        let batch = part.slice(0..3);

        assert_eq!(batch.x.row(0).to_vec(), vec![4., 5.]);
        assert_eq!(batch.y.row(0).to_vec(), vec![0., 0., 1.]);
        assert_eq!(batch.y.row(1).to_vec(), vec![0., 1., 0.]);
        assert_eq!(batch.y.row(2).to_vec(), vec![1., 0., 0.]);
    }

    #[test]
    fn partition_is_clamped_to_the_dataset() {
        let part = Partition::new(tiny(), 4..10, Labelling::Binary(0)).unwrap();
        assert_eq!(part.range(), 4..6);

        let part = Partition::new(tiny(), 8..10, Labelling::Binary(0)).unwrap();
        assert!(part.is_empty());
    }

    #[test]
    fn loads_csv_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1, 0.5, 1.5").unwrap();
        writeln!(file, "0, 2.0, -1.0").unwrap();

        let ds = Dataset::from_csv(file.path()).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.width(), 2);
        assert_eq!(ds.labels(), &[1, 0]);
        assert_eq!(ds.row(1), &[2.0, -1.0]);
    }

    #[test]
    fn csv_with_ragged_rows_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1,0.5,1.5").unwrap();
        writeln!(file, "0,2.0").unwrap();

        assert!(Dataset::from_csv(file.path()).is_err());
    }

    #[test]
    fn csv_labels_load_unchecked_until_the_class_count_is_known() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "42,0.5,1.5").unwrap();

        let ds = Dataset::from_csv(file.path()).unwrap();
        assert!(ds.check_labels(30).is_err());
    }
}
