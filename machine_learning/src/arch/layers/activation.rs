use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A parameterless layer applying an activation function element-wise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    dim: usize,
    act_fn: ActFn,
}

impl Activation {
    pub fn new(dim: usize, act_fn: ActFn) -> Self {
        Self { dim, act_fn }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the activations along with the pre-activations, which are its trace.
    pub fn forward(&self, x: ArrayView2<f32>) -> Result<(Array2<f32>, Array2<f32>)> {
        if x.ncols() != self.dim {
            return Err(MlErr::SizeMismatch {
                what: "activation input",
                got: x.ncols(),
                expected: self.dim,
            });
        }

        Ok((self.act_fn.apply(x), x.to_owned()))
    }

    pub fn backward(&self, z: &Array2<f32>, mut d: Array2<f32>) -> Array2<f32> {
        self.act_fn.chain(d.view_mut(), z.view());
        d
    }
}
