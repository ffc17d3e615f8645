use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::LossFn;

/// Cross-entropy between the expected distribution and the softmax of the raw outputs.
#[derive(Default, Clone, Copy, Debug)]
pub struct SoftmaxCe;

impl SoftmaxCe {
    /// Returns a new `SoftmaxCe`.
    pub fn new() -> Self {
        Self
    }

    fn log_softmax(y_pred: ArrayView2<f32>) -> Array2<f32> {
        let mut out = y_pred.to_owned();

        for mut row in out.rows_mut() {
            let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
            let log_sum = row.iter().map(|&x| (x - max).exp()).sum::<f32>().ln();
            row.mapv_inplace(|x| x - max - log_sum);
        }

        out
    }
}

impl LossFn for SoftmaxCe {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array1<f32> {
        -(&y * &Self::log_softmax(y_pred)).sum_axis(Axis(1))
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let softmax = Self::log_softmax(y_pred).mapv(f32::exp);
        let mass = y.sum_axis(Axis(1)).insert_axis(Axis(1));
        softmax * &mass - &y
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn uniform_logits_cost_log_width() {
        let loss = SoftmaxCe.loss(array![[0.0, 0.0, 0.0, 0.0]].view(), array![[0.0, 1.0, 0.0, 0.0]].view());
        assert!((loss[0] - 4f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn large_logits_stay_finite() {
        let loss = SoftmaxCe.loss(array![[1000.0, 0.0]].view(), array![[1.0, 0.0]].view());
        assert!(loss[0].is_finite());
        assert!(loss[0] < 1e-6);
    }

    #[test]
    fn derivative_matches_finite_differences() {
        let y_pred = array![[0.3, -1.2, 0.8]];
        let y = array![[0.2, 0.0, 0.8]];
        let d = SoftmaxCe.loss_prime(y_pred.view(), y.view());
        let eps = 1e-3;

        for j in 0..3 {
            let mut plus = y_pred.clone();
            let mut minus = y_pred.clone();
            plus[[0, j]] += eps;
            minus[[0, j]] -= eps;
            let numeric = (SoftmaxCe.loss(plus.view(), y.view())[0]
                - SoftmaxCe.loss(minus.view(), y.view())[0])
                / (2. * eps);
            assert!((numeric - d[[0, j]]).abs() < 1e-2);
        }
    }
}
