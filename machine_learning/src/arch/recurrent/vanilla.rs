use ndarray::{linalg, prelude::*};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result, arch::activations::ActFn, initialization};

/// An Elman recurrent cell: `h = act_fn(x · wx + h_prev · wh + b)`.
///
/// Its parameters are laid out as `wx` (in, hidden), then `wh` (hidden, hidden), then `b`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vanilla {
    dim: (usize, usize),
    act_fn: ActFn,
}

#[derive(Clone, Debug)]
pub struct VanillaTrace {
    x: Array2<f32>,
    h_prev: Array2<f32>,
    z: Array2<f32>,
}

impl Vanilla {
    /// Creates a new `Vanilla` cell.
    ///
    /// # Arguments
    /// * `dim` - The input width and the hidden state width.
    /// * `act_fn` - The activation applied to the new state.
    pub fn new(dim: (usize, usize), act_fn: ActFn) -> Self {
        Self { dim, act_fn }
    }

    pub fn size(&self) -> usize {
        let (i, h) = self.dim;
        i * h + h * h + h
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Advances the hidden state of `h_prev.nrows()` sequences by one step.
    ///
    /// # Returns
    /// The new hidden state, which is also the cell's output, and the step's trace.
    pub fn step(
        &self,
        params: &[f32],
        h_prev: ArrayView2<f32>,
        x: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, VanillaTrace)> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "rnn input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (wx, wh, b) = self.view_params(params)?;
        let mut z = x.dot(&wx);
        linalg::general_mat_mul(1.0, &h_prev, &wh, 1.0, &mut z);
        z += &b;

        let h = self.act_fn.apply(z.view());
        let trace = VanillaTrace {
            x: x.to_owned(),
            h_prev: h_prev.to_owned(),
            z,
        };

        Ok((h, trace))
    }

    /// Backpropagates one step, accumulating onto `grad`.
    ///
    /// # Arguments
    /// * `dh` - The delta with respect to this step's hidden state, counting both the
    ///   output and the following step.
    ///
    /// # Returns
    /// The deltas with respect to the step's input and to the previous hidden state.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        trace: &VanillaTrace,
        mut dh: Array2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        self.act_fn.chain(dh.view_mut(), trace.z.view());
        let dz = dh;

        let (mut dwx, mut dwh, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &trace.x.t(), &dz, 1.0, &mut dwx);
        linalg::general_mat_mul(1.0, &trace.h_prev.t(), &dz, 1.0, &mut dwh);
        db += &dz.sum_axis(Axis(0));

        let (wx, wh, _) = self.view_params(params)?;
        Ok((dz.dot(&wx.t()), dz.dot(&wh.t())))
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_len(params.len())?;

        let (i, h) = self.dim;
        let (wx, rest) = params.split_at_mut(i * h);
        let (wh, b) = rest.split_at_mut(h * h);
        initialization::xavier_uniform(rng, wx, i, h)?;
        initialization::xavier_uniform(rng, wh, h, h)?;
        b.fill(0.);
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "rnn parameters",
                got: len,
                expected: self.size(),
            });
        }

        Ok(())
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len(params.len())?;

        let (i, h) = self.dim;
        let (wx, rest) = params.split_at(i * h);
        let (wh, b) = rest.split_at(h * h);
        Ok((
            ArrayView2::from_shape((i, h), wx)?,
            ArrayView2::from_shape((h, h), wh)?,
            ArrayView1::from_shape(h, b)?,
        ))
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(
        ArrayViewMut2<'a, f32>,
        ArrayViewMut2<'a, f32>,
        ArrayViewMut1<'a, f32>,
    )> {
        self.check_len(grad.len())?;

        let (i, h) = self.dim;
        let (dwx, rest) = grad.split_at_mut(i * h);
        let (dwh, db) = rest.split_at_mut(h * h);
        Ok((
            ArrayViewMut2::from_shape((i, h), dwx)?,
            ArrayViewMut2::from_shape((h, h), dwh)?,
            ArrayViewMut1::from_shape(h, db)?,
        ))
    }
}
