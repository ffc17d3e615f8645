use ndarray::{Array1, Array2, ArrayView2};

/// A cost function over a batch of predictions, one sample per row.
pub trait LossFn {
    /// Computes the cost of every sample of the batch.
    ///
    /// # Arguments
    /// * `y_pred` - The network's raw outputs.
    /// * `y` - The expected outputs.
    ///
    /// # Returns
    /// One cost per row.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array1<f32>;

    /// Computes the derivative of every sample's cost with respect to its prediction.
    ///
    /// # Returns
    /// A matrix shaped like `y_pred`, not averaged over the batch.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}

impl<L: LossFn + ?Sized> LossFn for Box<L> {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array1<f32> {
        (**self).loss(y_pred, y)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        (**self).loss_prime(y_pred, y)
    }
}
