use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Activation, Dense, DenseTrace};
use crate::{Result, arch::activations::ActFn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Dense(Dense),
    Activation(Activation),
}

#[derive(Clone, Debug)]
pub enum LayerTrace {
    Dense(DenseTrace),
    Activation(Array2<f32>),
}

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn activation(dim: usize, act_fn: ActFn) -> Self {
        Self::Activation(Activation::new(dim, act_fn))
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Dense(l) => l.size(),
            Self::Activation(_) => 0,
        }
    }

    /// Returns the input and output widths of the layer.
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Self::Dense(l) => l.dim(),
            Self::Activation(l) => (l.dim(), l.dim()),
        }
    }

    pub fn forward(&self, params: &[f32], x: ArrayView2<f32>) -> Result<(Array2<f32>, LayerTrace)> {
        match self {
            Self::Dense(l) => {
                let (a, trace) = l.forward(params, x)?;
                Ok((a, LayerTrace::Dense(trace)))
            }
            Self::Activation(l) => {
                let (a, z) = l.forward(x)?;
                Ok((a, LayerTrace::Activation(z)))
            }
        }
    }

    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        trace: &LayerTrace,
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match (self, trace) {
            (Self::Dense(l), LayerTrace::Dense(trace)) => l.backward(params, grad, trace, d),
            (Self::Activation(l), LayerTrace::Activation(z)) => Ok(l.backward(z, d)),
            _ => unreachable!("a layer is always backpropagated with its own trace"),
        }
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match self {
            Self::Dense(l) => l.init(params, rng),
            Self::Activation(_) => Ok(()),
        }
    }
}
