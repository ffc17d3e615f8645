use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::layers::{Layer, LayerTrace};
use crate::{
    MlErr, Result,
    params::{GradIter, ParamIter},
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sequential {
    layers: Vec<Layer>,
}

/// The traces of every layer of a `Sequential` forward pass.
#[derive(Clone, Debug)]
pub struct SequentialTrace {
    layers: Vec<LayerTrace>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance, or an error if the layers are empty or their widths don't chain.
    pub fn new<I>(layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Layer>,
    {
        let sequential = Self {
            layers: layers.into_iter().collect(),
        };

        sequential.validate()?;
        Ok(sequential)
    }

    /// Checks that there's at least one layer, that no width is zero and that each layer's
    /// output width is the next one's input width.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(MlErr::EmptyModel);
        }

        if self.layers.iter().any(|l| l.dim().0 == 0 || l.dim().1 == 0) {
            return Err(MlErr::ZeroWidth("layer"));
        }

        for pair in self.layers.windows(2) {
            let (_, out) = pair[0].dim();
            let (next_in, _) = pair[1].dim();

            if out != next_in {
                return Err(MlErr::SizeMismatch {
                    what: "layer widths",
                    got: next_in,
                    expected: out,
                });
            }
        }

        Ok(())
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.layers.iter().map(Layer::size).sum()
    }

    pub fn in_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.dim().0)
    }

    pub fn out_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.dim().1)
    }

    /// Returns the parameter count of every layer that has parameters, in order.
    pub fn groups(&self) -> Vec<usize> {
        self.layers
            .iter()
            .map(Layer::size)
            .filter(|&size| size > 0)
            .collect()
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data.
    ///
    /// # Returns
    /// The prediction for the given input along with the trace of the pass.
    pub fn forward(&self, params: &[f32], x: ArrayView2<f32>) -> Result<(Array2<f32>, SequentialTrace)> {
        let mut front = ParamIter::new(params);
        let mut traces = Vec::with_capacity(self.layers.len());

        let mut layers = self.layers.iter();
        let Some(first) = layers.next() else {
            return Err(MlErr::EmptyModel);
        };

        let (mut a, trace) = first.forward(front.take(first.size())?, x)?;
        traces.push(trace);

        for layer in layers {
            let (next, trace) = layer.forward(front.take(layer.size())?, a.view())?;
            traces.push(trace);
            a = next;
        }

        Ok((a, SequentialTrace { layers: traces }))
    }

    /// Makes a forward pass, discarding the trace.
    pub fn apply(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        Ok(self.forward(params, x)?.0)
    }

    /// Backpropagates `d` through the network, accumulating the layers' gradients onto `grad`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - The model's gradient buffer.
    /// * `trace` - The trace of the matching forward pass.
    /// * `d` - The delta of the loss with respect to the network's output.
    ///
    /// # Returns
    /// The delta of the loss with respect to the network's input.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        trace: &SequentialTrace,
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let mut front = ParamIter::new(params);
        let mut grad_front = GradIter::new(grad);
        let mut chunks = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let size = layer.size();
            chunks.push((front.take(size)?, grad_front.take(size)?));
        }

        for ((layer, trace), (params, grad)) in self
            .layers
            .iter()
            .zip(&trace.layers)
            .zip(chunks)
            .rev()
        {
            d = layer.backward(params, grad, trace, d)?;
        }

        Ok(d)
    }

    /// Initializes the model's parameters.
    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = GradIter::new(params);

        for layer in &self.layers {
            layer.init(front.take(layer.size())?, rng)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::activations::ActFn;

    fn mlp() -> Sequential {
        Sequential::new([
            Layer::dense((2, 3), Some(ActFn::sigmoid(1.))),
            Layer::dense((3, 2), None),
            Layer::activation(2, ActFn::Tanh),
        ])
        .unwrap()
    }

    #[test]
    fn mismatched_widths_are_rejected() {
        let res = Sequential::new([Layer::dense((2, 3), None), Layer::dense((2, 1), None)]);
        assert!(matches!(res, Err(MlErr::SizeMismatch { got: 2, expected: 3, .. })));
        assert!(matches!(Sequential::new(Vec::<Layer>::new()), Err(MlErr::EmptyModel)));
    }

    #[test]
    fn zero_widths_are_rejected() {
        let res = Sequential::new([Layer::dense((2, 0), None), Layer::dense((0, 1), None)]);
        assert!(matches!(res, Err(MlErr::ZeroWidth(_))));
        assert!(Sequential::new([Layer::activation(0, ActFn::Tanh)]).is_err());
    }

    #[test]
    fn sizes_and_groups() {
        let model = mlp();
        assert_eq!(model.size(), 9 + 8);
        assert_eq!(model.groups(), [9, 8]);
        assert_eq!((model.in_size(), model.out_size()), (2, 2));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let model = mlp();
        let mut params = vec![0.; model.size()];
        model.init(&mut params, &mut crate::initialization::rng(Some(3))).unwrap();

        let x = array![[0.5, -1.0], [0.1, 0.7], [-0.4, 0.2]];
        let weights = array![[1.0, -2.0], [0.5, 0.5], [3.0, 1.0]];
        let loss = |p: &[f32]| (model.apply(p, x.view()).unwrap() * &weights).sum();

        let (_, trace) = model.forward(&params, x.view()).unwrap();
        let mut grad = vec![0.; model.size()];
        model
            .backward(&params, &mut grad, &trace, weights.clone())
            .unwrap();

        let eps = 1e-3;
        for i in 0..params.len() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += eps;
            minus[i] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2. * eps);
            assert!((numeric - grad[i]).abs() < 2e-2, "param {i}: {numeric} vs {}", grad[i]);
        }
    }
}
