use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::LossFn;

/// Mean squared error loss function.
#[derive(Default, Clone, Copy, Debug)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array1<f32> {
        let width = y_pred.ncols().max(1) as f32;
        (&y_pred - &y).mapv(|x| x.powi(2)).sum_axis(Axis(1)) / width
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let width = y_pred.ncols().max(1) as f32;
        (&y_pred - &y) * (2.0 / width)
    }
}
