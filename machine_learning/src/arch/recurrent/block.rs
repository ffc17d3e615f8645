use std::mem;

use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Cell, CellState, CellTrace};
use crate::{
    MlErr, Result,
    params::{GradIter, ParamIter},
};

/// A recurrent network: a stack of cells, each feeding its output to the next one at every
/// time-step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    cells: Vec<Cell>,
}

/// The recurrent state of a whole `Block` for a batch of sequences.
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    n: usize,
    cells: Vec<CellState>,
}

impl State {
    /// Returns the amount of sequences this state tracks.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

/// The per time-step, per cell traces of a `Block` forward pass.
#[derive(Clone, Debug)]
pub struct BlockTrace {
    n: usize,
    steps: Vec<Vec<CellTrace>>,
}

impl Block {
    /// Creates a new `Block`.
    ///
    /// # Arguments
    /// * `cells` - The stacked cells, from input to output.
    ///
    /// # Returns
    /// A new `Block` instance, or an error if there are no cells or their widths don't chain.
    pub fn new<I>(cells: I) -> Result<Self>
    where
        I: IntoIterator<Item = Cell>,
    {
        let block = Self {
            cells: cells.into_iter().collect(),
        };

        block.validate()?;
        Ok(block)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cells.is_empty() {
            return Err(MlErr::EmptyModel);
        }

        for cell in &self.cells {
            match cell {
                Cell::Layer(net) => net.validate()?,
                _ if cell.in_size() == 0 || cell.out_size() == 0 => {
                    return Err(MlErr::ZeroWidth("cell"));
                }
                _ => {}
            }
        }

        for pair in self.cells.windows(2) {
            if pair[0].out_size() != pair[1].in_size() {
                return Err(MlErr::SizeMismatch {
                    what: "cell widths",
                    got: pair[1].in_size(),
                    expected: pair[0].out_size(),
                });
            }
        }

        Ok(())
    }

    pub fn size(&self) -> usize {
        self.cells.iter().map(Cell::size).sum()
    }

    pub fn in_size(&self) -> usize {
        self.cells.first().map_or(0, Cell::in_size)
    }

    pub fn out_size(&self) -> usize {
        self.cells.last().map_or(0, Cell::out_size)
    }

    pub fn groups(&self) -> Vec<usize> {
        self.cells.iter().flat_map(Cell::groups).collect()
    }

    /// Returns the initial state for a batch of `n` sequences.
    pub fn start(&self, n: usize) -> State {
        State {
            n,
            cells: self.cells.iter().map(|cell| cell.start(n)).collect(),
        }
    }

    /// Advances every sequence of the batch one time-step.
    ///
    /// # Arguments
    /// * `params` - The block's parameters.
    /// * `state` - The state after the previous step.
    /// * `x` - This step's inputs, one row per sequence.
    ///
    /// # Returns
    /// This step's outputs and the next state.
    pub fn step(
        &self,
        params: &[f32],
        state: &State,
        x: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, State)> {
        let (out, next, _) = self.step_traced(params, state, x)?;
        Ok((out, next))
    }

    /// Unrolls the block over a whole batch of time-steps, starting from a fresh state.
    ///
    /// # Arguments
    /// * `params` - The block's parameters.
    /// * `n` - The amount of sequences in the batch.
    /// * `xs` - One `(n, in)` input matrix per time-step.
    ///
    /// # Returns
    /// One `(n, out)` output matrix per time-step and the trace of the whole pass.
    pub fn forward(
        &self,
        params: &[f32],
        n: usize,
        xs: &[Array2<f32>],
    ) -> Result<(Vec<Array2<f32>>, BlockTrace)> {
        let mut state = self.start(n);
        let mut outs = Vec::with_capacity(xs.len());
        let mut steps = Vec::with_capacity(xs.len());

        for x in xs {
            let (out, next, traces) = self.step_traced(params, &state, x.view())?;
            outs.push(out);
            steps.push(traces);
            state = next;
        }

        Ok((outs, BlockTrace { n, steps }))
    }

    /// Backpropagates through time, accumulating the cells' gradients onto `grad`.
    ///
    /// # Arguments
    /// * `params` - The block's parameters.
    /// * `grad` - The block's gradient buffer.
    /// * `trace` - The trace of the matching forward pass.
    /// * `ds` - The deltas with respect to every time-step's output.
    ///
    /// # Returns
    /// The deltas with respect to every time-step's input.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        trace: &BlockTrace,
        ds: Vec<Array2<f32>>,
    ) -> Result<Vec<Array2<f32>>> {
        if ds.len() != trace.steps.len() {
            return Err(MlErr::SizeMismatch {
                what: "time-steps",
                got: ds.len(),
                expected: trace.steps.len(),
            });
        }

        let mut front = ParamIter::new(params);
        let mut grad_front = GradIter::new(grad);
        let mut chunks = Vec::with_capacity(self.cells.len());

        for cell in &self.cells {
            let size = cell.size();
            chunks.push((front.take(size)?, grad_front.take(size)?));
        }

        let mut d_states: Vec<CellState> = self.start(trace.n).cells;
        let mut dxs = Vec::with_capacity(ds.len());

        for (traces, mut d) in trace.steps.iter().zip(ds).rev() {
            for (k, cell) in self.cells.iter().enumerate().rev() {
                let (params, grad) = &mut chunks[k];
                let d_state = mem::replace(&mut d_states[k], CellState::Stateless);
                let (dx, d_prev) = cell.backward(params, &mut **grad, &traces[k], d, d_state)?;
                d_states[k] = d_prev;
                d = dx;
            }

            dxs.push(d);
        }

        dxs.reverse();
        Ok(dxs)
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = GradIter::new(params);

        for cell in &self.cells {
            cell.init(front.take(cell.size())?, rng)?;
        }

        Ok(())
    }

    fn step_traced(
        &self,
        params: &[f32],
        state: &State,
        x: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, State, Vec<CellTrace>)> {
        if x.nrows() != state.n {
            return Err(MlErr::SizeMismatch {
                what: "batch",
                got: x.nrows(),
                expected: state.n,
            });
        }

        let mut front = ParamIter::new(params);
        let mut cells = Vec::with_capacity(self.cells.len());
        let mut traces = Vec::with_capacity(self.cells.len());
        let mut a = x.to_owned();

        for (cell, cell_state) in self.cells.iter().zip(&state.cells) {
            let (out, next, trace) = cell.step(front.take(cell.size())?, cell_state, a.view())?;
            cells.push(next);
            traces.push(trace);
            a = out;
        }

        let next = State { n: state.n, cells };
        Ok((a, next, traces))
    }
}
