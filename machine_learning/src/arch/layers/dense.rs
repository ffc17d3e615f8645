use ndarray::{linalg, prelude::*};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result, arch::activations::ActFn, initialization};

/// A fully connected layer: `a = act_fn(x · w + b)`.
///
/// The layer doesn't own its parameters, they are handed to it on every call as a flat slice
/// laid out as the row-major `(in, out)` weight matrix followed by the `out` biases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
}

/// What a `Dense` forward pass has to remember for its backward pass.
#[derive(Clone, Debug)]
pub struct DenseTrace {
    x: Array2<f32>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output widths.
    /// * `act_fn` - An optional activation function applied to the weighted sums.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self { dim, act_fn }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        (self.dim.0 + 1) * self.dim.1
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The input batch, one row per sample.
    ///
    /// # Returns
    /// The activations and the trace needed to backpropagate through them.
    pub fn forward(&self, params: &[f32], x: ArrayView2<f32>) -> Result<(Array2<f32>, DenseTrace)> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w);
        z += &b;

        let a = match &self.act_fn {
            Some(act_fn) => act_fn.apply(z.view()),
            None => z.clone(),
        };

        let trace = DenseTrace { x: x.to_owned(), z };
        Ok((a, trace))
    }

    /// Makes a backward pass through the layer, **accumulating** onto `grad`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's slice of the gradient buffer.
    /// * `trace` - The trace of the matching forward pass.
    /// * `d` - The delta of the loss with respect to this layer's output.
    ///
    /// # Returns
    /// The delta of the loss with respect to this layer's input.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        trace: &DenseTrace,
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        if let Some(act_fn) = &self.act_fn {
            act_fn.chain(d.view_mut(), trace.z.view());
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &trace.x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Fills this layer's parameters with Xavier-uniform weights and zeroed biases.
    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_len(params.len())?;

        let (w, b) = params.split_at_mut(self.size() - self.dim.1);
        initialization::xavier_uniform(rng, w, self.dim.0, self.dim.1)?;
        b.fill(0.);
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "dense parameters",
                got: len,
                expected: self.size(),
            });
        }

        Ok(())
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len(grad.len())?;

        let w_size = self.size() - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len(params.len())?;

        let w_size = self.size() - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn forward_computes_affine_map() {
        let dense = Dense::new((2, 1), None);
        let params = [1.0, 1.0, 0.5];
        let x = array![[1.0, 1.0], [2.0, -3.0]];

        let (a, _) = dense.forward(&params, x.view()).unwrap();
        assert_eq!(a, array![[2.5], [-0.5]]);
    }

    #[test]
    fn wrong_input_width_fails() {
        let dense = Dense::new((2, 1), None);
        let x = array![[1.0, 1.0, 1.0]];
        assert!(dense.forward(&[0.; 3], x.view()).is_err());
    }

    #[test]
    fn backward_matches_finite_differences() {
        let dense = Dense::new((3, 2), Some(ActFn::Tanh));
        let params: Vec<f32> = (0..dense.size()).map(|i| (i as f32 * 0.37).sin() * 0.5).collect();
        let x = array![[0.3, -0.1, 0.8], [-0.5, 0.2, 0.1]];

        // loss = sum of outputs
        let loss = |p: &[f32]| dense.forward(p, x.view()).unwrap().0.sum();

        let (a, trace) = dense.forward(&params, x.view()).unwrap();
        let mut grad = vec![0.; dense.size()];
        dense
            .backward(&params, &mut grad, &trace, Array2::ones(a.raw_dim()))
            .unwrap();

        let eps = 1e-3;
        for i in 0..params.len() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += eps;
            minus[i] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2. * eps);
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", grad[i]);
        }
    }
}
