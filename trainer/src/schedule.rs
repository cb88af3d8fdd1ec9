use std::num::NonZeroUsize;

/// Defines epoch boundaries and when to report progress over a run of training steps.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub iter_per_epoch: NonZeroUsize,
    pub epochs: usize,
    pub show_every: NonZeroUsize,
}

impl Schedule {
    pub fn new(iter_per_epoch: NonZeroUsize, epochs: usize, show_every: NonZeroUsize) -> Self {
        Self {
            iter_per_epoch,
            epochs,
            show_every,
        }
    }

    #[inline]
    pub fn total_steps(&self) -> usize {
        self.epochs * self.iter_per_epoch.get()
    }

    /// Returns true if this step completes an epoch.
    #[inline]
    pub fn ends_epoch(&self, step: usize) -> bool {
        (step + 1) % self.iter_per_epoch.get() == 0
    }

    /// The 1-based epoch `step` belongs to.
    #[inline]
    pub fn epoch_of(&self, step: usize) -> usize {
        step / self.iter_per_epoch.get() + 1
    }

    #[inline]
    pub fn should_show(&self, step: usize) -> bool {
        step % self.show_every.get() == 0
    }

    /// Percentages of the current epoch and of the whole run already done at `step`.
    pub fn progress(&self, step: usize) -> (f32, f32) {
        let iter = self.iter_per_epoch.get();
        let epoch = (step % iter) as f32 / iter as f32 * 100.;
        let total = step as f32 / self.total_steps().max(1) as f32 * 100.;
        (epoch, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(iter: usize, epochs: usize) -> Schedule {
        Schedule::new(
            NonZeroUsize::new(iter).unwrap(),
            epochs,
            NonZeroUsize::new(2).unwrap(),
        )
    }

    #[test]
    fn epoch_boundaries() {
        let s = schedule(3, 2);
        assert_eq!(s.total_steps(), 6);
        assert!(!s.ends_epoch(0));
        assert!(!s.ends_epoch(1));
        assert!(s.ends_epoch(2));
        assert!(s.ends_epoch(5));
        assert_eq!(s.epoch_of(2), 1);
        assert_eq!(s.epoch_of(3), 2);
    }

    #[test]
    fn progress_percentages() {
        let s = schedule(4, 2);
        assert_eq!(s.progress(0), (0., 0.));
        assert_eq!(s.progress(6), (50., 75.));
        assert!(s.should_show(6));
        assert!(!s.should_show(5));
    }
}
