use std::ops::Range;

/// Maps the ratio interval `[start, end)` onto sample indices of a dataset of `total` samples.
///
/// Properties:
/// - Consecutive intervals (`[a, b)` then `[b, c)`) produce contiguous, disjoint ranges.
/// - Ratios are clamped to `[0, 1]`.
pub fn ratio_range(total: usize, start: f32, end: f32) -> Range<usize> {
    // f32 ratios such as 0.01 sit just below their decimal value
    let index = |ratio: f32| {
        let exact = total as f64 * ratio.clamp(0., 1.) as f64 * (1. + 1e-6);
        (exact.floor() as usize).min(total)
    };

    let start = index(start);
    let end = index(end).max(start);
    start..end
}

/// The train and validation ranges for a dataset of `total` samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitSpec {
    pub train_ratio: f32,
    pub val_end_ratio: f32,
}

impl SplitSpec {
    pub fn new(train_ratio: f32, val_end_ratio: f32) -> Self {
        Self {
            train_ratio,
            val_end_ratio,
        }
    }

    #[inline]
    pub fn train(self, total: usize) -> Range<usize> {
        ratio_range(total, 0., self.train_ratio)
    }

    #[inline]
    pub fn validation(self, total: usize) -> Range<usize> {
        ratio_range(total, self.train_ratio, self.val_end_ratio)
    }
}
