use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};

use super::Sigmoid;

/// An element-wise activation function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Tanh,
    Relu,
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid(Sigmoid::new(amp))
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.f(x),
            Self::Tanh => x.tanh(),
            Self::Relu => x.max(0.),
        }
    }

    pub fn df(&self, x: f32) -> f32 {
        match self {
            Self::Sigmoid(a) => a.df(x),
            Self::Tanh => 1. - x.tanh().powi(2),
            Self::Relu => {
                if x > 0. {
                    1.
                } else {
                    0.
                }
            }
        }
    }

    /// Applies the function to every pre-activation in `z`.
    pub fn apply(&self, z: ArrayView2<f32>) -> Array2<f32> {
        z.mapv(|z| self.f(z))
    }

    /// Scales the incoming delta `d` by the derivative evaluated at the pre-activations `z`.
    pub fn chain(&self, mut d: ArrayViewMut2<f32>, z: ArrayView2<f32>) {
        d.zip_mut_with(&z, |d, &z| *d *= self.df(z));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivatives_match_finite_differences() {
        let eps = 1e-3;

        for act_fn in [ActFn::sigmoid(1.), ActFn::sigmoid(2.), ActFn::Tanh, ActFn::Relu] {
            for x in [-1.3_f32, -0.2, 0.4, 2.1] {
                let numeric = (act_fn.f(x + eps) - act_fn.f(x - eps)) / (2. * eps);
                assert!(
                    (numeric - act_fn.df(x)).abs() < 1e-2,
                    "{act_fn:?} at {x}: {numeric} vs {}",
                    act_fn.df(x)
                );
            }
        }
    }
}
