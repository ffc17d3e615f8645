use super::{Optimizer, optimizer::check_sizes};
use crate::{MlErr, Result};

/// Running estimates of a parameter's gradient mean and uncentered variance.
#[derive(Debug, Default, Clone, Copy)]
struct Moments {
    mean: f32,
    var: f32,
}

/// Adaptive moment estimation.
///
/// Every parameter keeps exponentially decaying averages of its gradient and squared gradient.
/// Steps are scaled by their bias corrected ratio, so early updates aren't damped by the zero
/// initial estimates.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    decay1: f32,
    decay2: f32,
    damping: f32,
    steps: i32,
    moments: Box<[Moments]>,
}

impl Adam {
    pub const DECAY1: f32 = 0.9;
    pub const DECAY2: f32 = 0.999;
    pub const DAMPING: f32 = 1e-8;

    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters to optimize.
    /// * `learning_rate` - The largest step taken by a single parameter on a single update.
    /// * `decay1` - The decay rate of the gradient mean.
    /// * `decay2` - The decay rate of the squared gradient mean.
    /// * `damping` - Added to the root of the variance to keep steps finite.
    pub fn new(len: usize, learning_rate: f32, decay1: f32, decay2: f32, damping: f32) -> Self {
        Self {
            learning_rate,
            decay1,
            decay2,
            damping,
            steps: 0,
            moments: vec![Moments::default(); len].into_boxed_slice(),
        }
    }

    /// Creates a new `Adam` optimizer with the usual decay rates and damping.
    pub fn with_defaults(len: usize, learning_rate: f32) -> Self {
        Self::new(len, learning_rate, Self::DECAY1, Self::DECAY2, Self::DAMPING)
    }

    /// The step size after bias correction for the current update.
    fn corrected_rate(&self) -> f32 {
        let correction1 = 1. - self.decay1.powi(self.steps);
        let correction2 = 1. - self.decay2.powi(self.steps);
        self.learning_rate * correction2.sqrt() / correction1
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        if self.moments.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer state",
                got: params.len(),
                expected: self.moments.len(),
            });
        }

        self.steps = self.steps.saturating_add(1);
        let rate = self.corrected_rate();
        let (d1, d2, damping) = (self.decay1, self.decay2, self.damping);

        for ((p, &g), m) in params.iter_mut().zip(grad).zip(self.moments.iter_mut()) {
            m.mean = d1 * m.mean + (1. - d1) * g;
            m.var = d2 * m.var + (1. - d2) * g * g;
            *p -= rate * m.mean / (m.var.sqrt() + damping);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_has_learning_rate_length() {
        let mut optimizer = Adam::with_defaults(2, 0.1);
        let mut params = [0.0, 0.0];
        optimizer.update_params(&[3.0, -0.01], &mut params).unwrap();

        assert!((params[0] + 0.1).abs() < 1e-4);
        assert!((params[1] - 0.1).abs() < 1e-3);
    }

    #[test]
    fn steady_gradients_keep_a_steady_step() {
        let mut optimizer = Adam::with_defaults(1, 0.01);
        let mut params = [0.0];
        for _ in 0..50 {
            optimizer.update_params(&[2.0], &mut params).unwrap();
        }

        assert!((params[0] + 0.5).abs() < 1e-3, "{}", params[0]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut optimizer = Adam::with_defaults(2, 0.1);
        assert!(optimizer.update_params(&[1.0], &mut [0.0]).is_err());
    }
}
