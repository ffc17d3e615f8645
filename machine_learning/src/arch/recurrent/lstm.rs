use ndarray::{concatenate, linalg, prelude::*};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result, initialization};

/// A long short-term memory cell.
///
/// The four gates share one weight layout: `wx` (in, 4 * hidden), `wh` (hidden, 4 * hidden)
/// and `b` (4 * hidden), with the gate columns ordered input, forget, output, candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lstm {
    dim: (usize, usize),
}

#[derive(Clone, Debug)]
pub struct LstmTrace {
    x: Array2<f32>,
    h_prev: Array2<f32>,
    c_prev: Array2<f32>,
    i: Array2<f32>,
    f: Array2<f32>,
    o: Array2<f32>,
    g: Array2<f32>,
    c: Array2<f32>,
}

fn sigmoid(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}

impl Lstm {
    /// Creates a new `Lstm` cell.
    ///
    /// # Arguments
    /// * `dim` - The input width and the hidden state width.
    pub fn new(dim: (usize, usize)) -> Self {
        Self { dim }
    }

    pub fn size(&self) -> usize {
        let (i, h) = self.dim;
        4 * (i * h + h * h + h)
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Advances the hidden and cell states by one step.
    ///
    /// # Returns
    /// The new hidden state (the cell's output), the new cell state and the step's trace.
    pub fn step(
        &self,
        params: &[f32],
        h_prev: ArrayView2<f32>,
        c_prev: ArrayView2<f32>,
        x: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>, LstmTrace)> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "lstm input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let h = self.dim.1;
        let (wx, wh, b) = self.view_params(params)?;
        let mut z = x.dot(&wx);
        linalg::general_mat_mul(1.0, &h_prev, &wh, 1.0, &mut z);
        z += &b;

        let i = z.slice(s![.., 0..h]).mapv(sigmoid);
        let f = z.slice(s![.., h..2 * h]).mapv(sigmoid);
        let o = z.slice(s![.., 2 * h..3 * h]).mapv(sigmoid);
        let g = z.slice(s![.., 3 * h..]).mapv(f32::tanh);

        let c = &f * &c_prev + &i * &g;
        let h_new = &o * &c.mapv(f32::tanh);

        let trace = LstmTrace {
            x: x.to_owned(),
            h_prev: h_prev.to_owned(),
            c_prev: c_prev.to_owned(),
            i,
            f,
            o,
            g,
            c: c.clone(),
        };

        Ok((h_new, c, trace))
    }

    /// Backpropagates one step, accumulating onto `grad`.
    ///
    /// # Arguments
    /// * `dh` - The delta with respect to this step's hidden state.
    /// * `dc` - The delta with respect to this step's cell state, coming from the next step.
    ///
    /// # Returns
    /// The deltas with respect to the input, the previous hidden state and the previous cell state.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        trace: &LstmTrace,
        dh: Array2<f32>,
        dc: Array2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>, Array2<f32>)> {
        let LstmTrace {
            x,
            h_prev,
            c_prev,
            i,
            f,
            o,
            g,
            c,
        } = trace;

        let tc = c.mapv(f32::tanh);
        let d_o = &dh * &tc;
        let dc = dc + &dh * o * &tc.mapv(|t| 1. - t * t);
        let d_i = &dc * g;
        let d_g = &dc * i;
        let d_f = &dc * c_prev;
        let dc_prev = &dc * f;

        let dz_i = d_i * &i.mapv(|s| s * (1. - s));
        let dz_f = d_f * &f.mapv(|s| s * (1. - s));
        let dz_o = d_o * &o.mapv(|s| s * (1. - s));
        let dz_g = d_g * &g.mapv(|t| 1. - t * t);
        let dz = concatenate(
            Axis(1),
            &[dz_i.view(), dz_f.view(), dz_o.view(), dz_g.view()],
        )?;

        let (mut dwx, mut dwh, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &dz, 1.0, &mut dwx);
        linalg::general_mat_mul(1.0, &h_prev.t(), &dz, 1.0, &mut dwh);
        db += &dz.sum_axis(Axis(0));

        let (wx, wh, _) = self.view_params(params)?;
        Ok((dz.dot(&wx.t()), dz.dot(&wh.t()), dc_prev))
    }

    /// Xavier-uniform weights, zeroed biases except the forget gate's, which start at 1.
    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_len(params.len())?;

        let (i, h) = self.dim;
        let (wx, rest) = params.split_at_mut(4 * i * h);
        let (wh, b) = rest.split_at_mut(4 * h * h);
        initialization::xavier_uniform(rng, wx, i, 4 * h)?;
        initialization::xavier_uniform(rng, wh, h, 4 * h)?;
        b.fill(0.);
        b[h..2 * h].fill(1.);
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "lstm parameters",
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
        let (wx, rest) = params.split_at(4 * i * h);
        let (wh, b) = rest.split_at(4 * h * h);
        Ok((
            ArrayView2::from_shape((i, 4 * h), wx)?,
            ArrayView2::from_shape((h, 4 * h), wh)?,
            ArrayView1::from_shape(4 * h, b)?,
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
        let (dwx, rest) = grad.split_at_mut(4 * i * h);
        let (dwh, db) = rest.split_at_mut(4 * h * h);
        Ok((
            ArrayViewMut2::from_shape((i, 4 * h), dwx)?,
            ArrayViewMut2::from_shape((h, 4 * h), dwh)?,
            ArrayViewMut1::from_shape(4 * h, db)?,
        ))
    }
}
