use ndarray::{ArrayView1, ArrayView2, Axis, Zip};

use crate::{MlErr, Result, arch::loss::clamp_prob};

/// Fraction of rows whose most probable class matches the labelled one.
pub fn accuracy(probabilities: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<f32> {
    check_shapes(probabilities, labels)?;

    let hits = probabilities
        .axis_iter(Axis(0))
        .zip(labels.axis_iter(Axis(0)))
        .filter(|(p, y)| argmax(*p) == argmax(*y))
        .count();

    Ok(hits as f32 / probabilities.nrows() as f32)
}

/// `-Σ label * ln(p) / samples`, with `p` clamped to `[1e-15, 1 - 1e-15]`.
pub fn log_loss(probabilities: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<f32> {
    check_shapes(probabilities, labels)?;

    let total = Zip::from(probabilities)
        .and(labels)
        .fold(0f64, |acc, &p, &y| acc - y as f64 * clamp_prob(p).ln());

    Ok((total / probabilities.nrows() as f64) as f32)
}

/// Index of the first maximum of `row`.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 { (i, v) } else { best }
        })
        .0
}

fn check_shapes(probabilities: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<()> {
    if probabilities.nrows() == 0 {
        return Err(MlErr::EmptyInput("evaluation set"));
    }

    if probabilities.dim() != labels.dim() {
        return Err(MlErr::SizeMismatch {
            what: "labels",
            got: labels.len(),
            expected: probabilities.len(),
        });
    }

    Ok(())
}
