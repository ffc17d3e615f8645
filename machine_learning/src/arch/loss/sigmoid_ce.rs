use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use super::LossFn;

/// Binary cross-entropy between the expected outputs and the sigmoid of the raw outputs,
/// summed over every component.
#[derive(Default, Clone, Copy, Debug)]
pub struct SigmoidCe;

impl SigmoidCe {
    /// Returns a new `SigmoidCe`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for SigmoidCe {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array1<f32> {
        // max(x, 0) - x*y + ln(1 + e^-|x|)
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&x, &y| x.max(0.) - x * y + (-x.abs()).exp().ln_1p())
            .sum_axis(Axis(1))
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&x, &y| 1. / (1. + (-x).exp()) - y)
    }
}
