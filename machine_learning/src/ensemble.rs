use log::debug;
use ndarray::{Array2, ArrayView2, Axis, parallel::prelude::*};

use crate::{MlErr, Result};

/// Exponent of the boost applied to the winning classifier's score.
pub const BOOST_EXPONENT: f32 = 1.2;

/// Combines the "win" probabilities of one binary classifier per class into a single
/// distribution per sample, biased towards historically reliable classifiers.
#[derive(Debug, Clone)]
pub struct EnsembleScorer {
    weights: Vec<f32>,
}

impl EnsembleScorer {
    /// Creates a new `EnsembleScorer`.
    ///
    /// # Arguments
    /// * `weights` - The reliability weight of every classifier, indexed by class. Every weight
    ///   must be finite and within `[0, 1)`, the boost divides by `1 - weight`.
    pub fn new(weights: Vec<f32>) -> Result<Self> {
        if weights.is_empty() {
            return Err(MlErr::EmptyInput("reliability weight table"));
        }

        for (classifier, &weight) in weights.iter().enumerate() {
            if !weight.is_finite() || !(0. ..1.).contains(&weight) {
                return Err(MlErr::InvalidReliability { classifier, weight });
            }
        }

        Ok(Self { weights })
    }

    pub fn num_classes(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Rescales a winning score: `score / (1 - weight)^1.2 * weight`.
    pub fn boost(score: f32, weight: f32) -> f32 {
        score / (1. - weight).powf(BOOST_EXPONENT) * weight
    }

    /// Returns, for every sample (column of `scores`), the first classifier maximizing
    /// `score * weight`.
    pub fn winners(&self, scores: ArrayView2<f32>) -> Result<Vec<usize>> {
        self.validate(scores)?;

        Ok(scores
            .axis_iter(Axis(1))
            .map(|column| self.winner(column.iter().copied()))
            .collect())
    }

    /// Returns a copy of `scores` where every sample's winning score has been boosted.
    pub fn boosted_scores(&self, scores: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.validate(scores)?;

        let mut boosted = scores.to_owned();
        boosted
            .axis_iter_mut(Axis(1))
            .into_par_iter()
            .for_each(|mut column| {
                let winner = self.winner(column.iter().copied());
                column[winner] = Self::boost(column[winner], self.weights[winner]);
            });

        Ok(boosted)
    }

    /// Combines a `[num_classes × num_samples]` score matrix into class probabilities.
    ///
    /// # Returns
    /// A `[num_samples × num_classes]` matrix whose rows are probability distributions.
    pub fn combine(&self, scores: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut boosted = self.boosted_scores(scores)?;
        debug!(
            "combining {} classifiers over {} samples",
            boosted.nrows(),
            boosted.ncols()
        );

        // Shifting by the column max keeps large boosts from overflowing `exp`.
        boosted.axis_iter_mut(Axis(1)).for_each(|mut column| {
            let max = column.fold(f32::NEG_INFINITY, |acc, &s| acc.max(s));
            column.mapv_inplace(|s| (s - max).exp());
            let sum = column.sum();
            column /= sum;
        });

        Ok(boosted.reversed_axes().as_standard_layout().into_owned())
    }

    fn winner(&self, column: impl Iterator<Item = f32>) -> usize {
        column
            .zip(&self.weights)
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, (score, weight))| {
                let weighted = score * weight;
                if weighted > best.1 { (i, weighted) } else { best }
            })
            .0
    }

    fn validate(&self, scores: ArrayView2<f32>) -> Result<()> {
        if scores.nrows() != self.weights.len() {
            return Err(MlErr::SizeMismatch {
                what: "ensemble score rows",
                got: scores.nrows(),
                expected: self.weights.len(),
            });
        }

        if let Some(((classifier, sample), _)) = scores.indexed_iter().find(|(_, s)| !s.is_finite()) {
            return Err(MlErr::NonFiniteScore { classifier, sample });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn reliable_classifier_wins_every_sample() {
        let scorer = EnsembleScorer::new(vec![0.9, 0.6, 0.5]).unwrap();
        let scores = array![
            [0.95, 0.80, 0.10],
            [0.90, 0.70, 0.05],
            [0.50, 0.60, 0.09],
        ];

        assert_eq!(scorer.winners(scores.view()).unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn boosted_score_follows_the_literal_formula() {
        let mut weights = vec![0.5; 3];
        weights[0] = 0.972826;
        let scorer = EnsembleScorer::new(weights).unwrap();
        let scores = array![[0.9, 0.9, 0.05], [0.3, 0.2, 0.01], [0.1, 0.4, 0.02]];

        assert_eq!(scorer.winners(scores.view()).unwrap(), vec![0, 0, 0]);

        let boosted = scorer.boosted_scores(scores.view()).unwrap();
        let expected = 0.9f32 / (1. - 0.972826f32).powf(1.2) * 0.972826;
        assert_eq!(boosted[[0, 0]], expected);
        // losers are untouched
        assert_eq!(boosted[[1, 0]], 0.3);
    }

    #[test]
    fn combined_rows_are_distributions_and_input_is_untouched() {
        let scorer = EnsembleScorer::new(vec![0.8, 0.7]).unwrap();
        let scores = array![[0.9, 0.2, 0.4], [0.1, 0.7, 0.4]];
        let before = scores.clone();

        let probs = scorer.combine(scores.view()).unwrap();
        assert_eq!(probs.dim(), (3, 2));
        for row in probs.rows() {
            assert!((row.sum() - 1.).abs() < 1e-5);
        }
        assert!(probs[[0, 0]] > probs[[0, 1]]);
        assert!(probs[[1, 1]] > probs[[1, 0]]);
        assert_eq!(scores, before);
    }

    #[test]
    fn near_one_weight_keeps_probabilities_finite() {
        let scorer = EnsembleScorer::new(vec![0.99, 0.5]).unwrap();
        let probs = scorer.combine(array![[1.0], [0.2]].view()).unwrap();

        assert!(probs.iter().all(|p| p.is_finite()), "{probs:?}");
        assert!((probs.row(0).sum() - 1.).abs() < 1e-6);
        assert!(probs[[0, 0]] > 0.999);
    }

    #[test]
    fn weight_of_one_is_rejected() {
        let err = EnsembleScorer::new(vec![0.5, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            MlErr::InvalidReliability { classifier: 1, .. }
        ));
        assert!(EnsembleScorer::new(vec![f32::NAN]).is_err());
        assert!(EnsembleScorer::new(vec![-0.1]).is_err());
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let scorer = EnsembleScorer::new(vec![0.9, 0.5]).unwrap();
        let scores = array![[0.2, f32::NAN], [0.1, 0.3]];
        assert!(matches!(
            scorer.combine(scores.view()),
            Err(MlErr::NonFiniteScore {
                classifier: 0,
                sample: 1
            })
        ));
    }

    #[test]
    fn row_count_must_match_the_weight_table() {
        let scorer = EnsembleScorer::new(vec![0.9, 0.5, 0.4]).unwrap();
        assert!(scorer.combine(array![[0.1], [0.2]].view()).is_err());
    }
}
