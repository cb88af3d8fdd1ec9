use serde::{Deserialize, Serialize};

/// Logistic activation scaled to `(0, amp)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sigmoid {
    amp: f32,
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        self.amp * logistic(z)
    }

    pub fn df(&self, z: f32) -> f32 {
        let s = logistic(z);
        self.amp * s * (1. - s)
    }
}

// Never exponentiates a positive number, so large |z| saturates instead of overflowing.
fn logistic(z: f32) -> f32 {
    if z >= 0. {
        1. / (1. + (-z).exp())
    } else {
        let e = z.exp();
        e / (1. + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_without_nan() {
        let s = Sigmoid::new(2.);

        assert_eq!(s.f(0.), 1.);
        assert!((s.f(200.) - 2.).abs() < 1e-6);
        assert!(s.f(-200.).abs() < 1e-6);
        assert!(s.df(-200.).is_finite());
        assert!((s.df(0.) - 0.5).abs() < 1e-6);
    }
}
