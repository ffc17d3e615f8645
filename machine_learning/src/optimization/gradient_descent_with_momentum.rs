use super::{Optimizer, optimizer::check_sizes};
use crate::{MlErr, Result};

/// Gradient descent that keeps a decaying sum of past gradients and steps along it.
#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: Vec<f32>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters to optimize.
    /// * `learning_rate` - The scale applied to the velocity on every update.
    /// * `momentum` - The fraction of the velocity carried over to the next update.
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: vec![0.; len],
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        if self.velocity.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer state",
                got: params.len(),
                expected: self.velocity.len(),
            });
        }

        for (v, &g) in self.velocity.iter_mut().zip(grad) {
            *v = self.momentum * *v + g;
        }

        for (p, &v) in params.iter_mut().zip(&self.velocity) {
            *p -= self.learning_rate * v;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_accumulates() {
        let mut optimizer = GradientDescentWithMomentum::new(1, 1.0, 0.5);
        let mut params = [0.0];

        optimizer.update_params(&[1.0], &mut params).unwrap();
        assert_eq!(params, [-1.0]);

        optimizer.update_params(&[1.0], &mut params).unwrap();
        assert_eq!(params, [-2.5]);
    }

    #[test]
    fn zero_momentum_is_plain_descent() {
        let mut optimizer = GradientDescentWithMomentum::new(2, 0.5, 0.);
        let mut params = [1.0, 1.0];

        optimizer.update_params(&[2.0, -2.0], &mut params).unwrap();
        optimizer.update_params(&[2.0, -2.0], &mut params).unwrap();
        assert_eq!(params, [-1.0, 3.0]);
    }

    #[test]
    fn state_size_must_match() {
        let mut optimizer = GradientDescentWithMomentum::new(2, 0.5, 0.9);
        assert!(optimizer.update_params(&[1.0], &mut [0.0]).is_err());
    }
}
