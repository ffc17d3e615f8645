use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Lstm, LstmTrace, Vanilla, VanillaTrace};
use crate::{
    Result,
    arch::{Sequential, SequentialTrace, activations::ActFn},
};

/// One stage of a recurrent `Block`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Vanilla(Vanilla),
    Lstm(Lstm),
    /// A feed-forward network applied independently at every time-step.
    Layer(Sequential),
}

/// The recurrent state a `Cell` carries between time-steps, for a whole batch.
#[derive(Clone, Debug, PartialEq)]
pub enum CellState {
    Vanilla(Array2<f32>),
    Lstm { h: Array2<f32>, c: Array2<f32> },
    Stateless,
}

#[derive(Clone, Debug)]
pub enum CellTrace {
    Vanilla(VanillaTrace),
    Lstm(LstmTrace),
    Layer(SequentialTrace),
}

impl Cell {
    pub fn vanilla(dim: (usize, usize), act_fn: ActFn) -> Self {
        Self::Vanilla(Vanilla::new(dim, act_fn))
    }

    pub fn lstm(dim: (usize, usize)) -> Self {
        Self::Lstm(Lstm::new(dim))
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Vanilla(c) => c.size(),
            Self::Lstm(c) => c.size(),
            Self::Layer(s) => s.size(),
        }
    }

    pub fn in_size(&self) -> usize {
        match self {
            Self::Vanilla(c) => c.dim().0,
            Self::Lstm(c) => c.dim().0,
            Self::Layer(s) => s.in_size(),
        }
    }

    pub fn out_size(&self) -> usize {
        match self {
            Self::Vanilla(c) => c.dim().1,
            Self::Lstm(c) => c.dim().1,
            Self::Layer(s) => s.out_size(),
        }
    }

    pub fn groups(&self) -> Vec<usize> {
        match self {
            Self::Layer(s) => s.groups(),
            _ => vec![self.size()],
        }
    }

    /// Returns the initial state for `n` sequences.
    pub fn start(&self, n: usize) -> CellState {
        match self {
            Self::Vanilla(c) => CellState::Vanilla(Array2::zeros((n, c.dim().1))),
            Self::Lstm(c) => CellState::Lstm {
                h: Array2::zeros((n, c.dim().1)),
                c: Array2::zeros((n, c.dim().1)),
            },
            Self::Layer(_) => CellState::Stateless,
        }
    }

    /// Advances the cell one time-step.
    ///
    /// # Returns
    /// The step's output, the next state and the step's trace.
    pub fn step(
        &self,
        params: &[f32],
        state: &CellState,
        x: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, CellState, CellTrace)> {
        match (self, state) {
            (Self::Vanilla(cell), CellState::Vanilla(h)) => {
                let (h, trace) = cell.step(params, h.view(), x)?;
                Ok((h.clone(), CellState::Vanilla(h), CellTrace::Vanilla(trace)))
            }
            (Self::Lstm(cell), CellState::Lstm { h, c }) => {
                let (h, c, trace) = cell.step(params, h.view(), c.view(), x)?;
                Ok((h.clone(), CellState::Lstm { h, c }, CellTrace::Lstm(trace)))
            }
            (Self::Layer(net), CellState::Stateless) => {
                let (a, trace) = net.forward(params, x)?;
                Ok((a, CellState::Stateless, CellTrace::Layer(trace)))
            }
            _ => unreachable!("a cell is always stepped with its own state"),
        }
    }

    /// Backpropagates one time-step, accumulating onto `grad`.
    ///
    /// # Arguments
    /// * `trace` - The trace of the matching step.
    /// * `d` - The delta with respect to the step's output.
    /// * `d_state` - The delta with respect to the step's next state, coming from the following step.
    ///
    /// # Returns
    /// The delta with respect to the step's input and the delta with respect to the previous state.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        trace: &CellTrace,
        d: Array2<f32>,
        d_state: CellState,
    ) -> Result<(Array2<f32>, CellState)> {
        match (self, trace, d_state) {
            (Self::Vanilla(cell), CellTrace::Vanilla(trace), CellState::Vanilla(dh)) => {
                let (dx, dh_prev) = cell.backward(params, grad, trace, d + dh)?;
                Ok((dx, CellState::Vanilla(dh_prev)))
            }
            (Self::Lstm(cell), CellTrace::Lstm(trace), CellState::Lstm { h: dh, c: dc }) => {
                let (dx, dh_prev, dc_prev) = cell.backward(params, grad, trace, d + dh, dc)?;
                Ok((dx, CellState::Lstm { h: dh_prev, c: dc_prev }))
            }
            (Self::Layer(net), CellTrace::Layer(trace), CellState::Stateless) => {
                let dx = net.backward(params, grad, trace, d)?;
                Ok((dx, CellState::Stateless))
            }
            _ => unreachable!("a cell is always backpropagated with its own trace"),
        }
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match self {
            Self::Vanilla(c) => c.init(params, rng),
            Self::Lstm(c) => c.init(params, rng),
            Self::Layer(s) => s.init(params, rng),
        }
    }
}
