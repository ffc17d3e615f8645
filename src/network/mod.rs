mod variant;

pub use variant::{Batch, ModelVariant, TrainBatch};

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use log::{debug, info};
use machine_learning::{
    MlErr,
    arch::{Sequential, recurrent::Block},
    initialization,
};
use serde::{Deserialize, Serialize};

use crate::{CliErr, Result};

/// A model artifact: the declared vector widths, the network's shape and its parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Network {
    in_size: usize,
    out_size: usize,
    variant: ModelVariant,
    params: Vec<f32>,
}

impl Network {
    /// Creates a network with freshly initialized parameters.
    ///
    /// # Arguments
    /// * `variant` - The network's shape.
    /// * `seed` - An optional seed, for reproducible parameters.
    ///
    /// # Returns
    /// The new network, or an error if the shape is inconsistent.
    pub fn new(variant: ModelVariant, seed: Option<u64>) -> Result<Self> {
        variant.validate()?;

        let mut params = vec![0.; variant.size()];
        variant.init(&mut params, &mut initialization::rng(seed))?;

        Ok(Self::from_parts(variant, params))
    }

    fn from_parts(variant: ModelVariant, params: Vec<f32>) -> Self {
        Self {
            in_size: variant.in_size(),
            out_size: variant.out_size(),
            variant,
            params,
        }
    }

    /// Joins two RNNs and a feed-forward mixer into a bidirectional RNN.
    ///
    /// # Returns
    /// `TypeMismatch` if the components have the wrong kinds, if the mixer's input width isn't
    /// the sum of the RNNs' output widths or if the RNNs' input widths differ.
    pub fn bidirectional(forward: Network, backward: Network, mixer: Network) -> Result<Self> {
        let (forward, forward_params) = forward.into_recurrent("forward")?;
        let (backward, backward_params) = backward.into_recurrent("backward")?;
        let (mixer, mixer_params) = mixer.into_feed_forward("mixer")?;

        let variant = ModelVariant::Bidirectional {
            forward,
            backward,
            mixer,
        };
        variant.validate()?;

        let params = [forward_params, backward_params, mixer_params].concat();
        Ok(Self::from_parts(variant, params))
    }

    /// Joins an RNN and a feed-forward network applied to its last output.
    ///
    /// # Returns
    /// `TypeMismatch` if the components have the wrong kinds or if the out net's input width
    /// isn't the RNN's output width.
    pub fn seq_to_vec(rnn: Network, out_net: Network) -> Result<Self> {
        let (block, block_params) = rnn.into_recurrent("rnn")?;
        let (out, out_params) = out_net.into_feed_forward("out net")?;

        let variant = ModelVariant::SeqToVec { block, out };
        variant.validate()?;

        Ok(Self::from_parts(variant, [block_params, out_params].concat()))
    }

    fn into_recurrent(self, what: &'static str) -> Result<(Block, Vec<f32>)> {
        match self.variant {
            ModelVariant::Recurrent(block) => Ok((block, self.params)),
            other => Err(CliErr::TypeMismatch {
                what,
                expected: "an RNN".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    fn into_feed_forward(self, what: &'static str) -> Result<(Sequential, Vec<f32>)> {
        match self.variant {
            ModelVariant::FeedForward(net) => Ok((net, self.params)),
            other => Err(CliErr::TypeMismatch {
                what,
                expected: "a feed-forward network".to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    /// Loads and checks a network file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let network: Network = serde_json::from_reader(BufReader::new(file))?;
        network.validate()?;

        debug!(
            "loaded {} from {} with {} parameters",
            network.variant.kind(),
            path.display(),
            network.params.len()
        );

        Ok(network)
    }

    /// Saves the network to a file, replacing it.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;

        info!("saved {} to {}", self.variant.kind(), path.display());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.variant.validate()?;

        let size = self.variant.size();
        if self.params.len() != size {
            return Err(MlErr::SizeMismatch {
                what: "network parameters",
                got: self.params.len(),
                expected: size,
            }
            .into());
        }

        if (self.in_size, self.out_size) != (self.variant.in_size(), self.variant.out_size()) {
            return Err(CliErr::TypeMismatch {
                what: "declared vector sizes",
                expected: format!("{}->{}", self.variant.in_size(), self.variant.out_size()),
                got: format!("{}->{}", self.in_size, self.out_size),
            });
        }

        Ok(())
    }

    pub fn in_size(&self) -> usize {
        self.in_size
    }

    pub fn out_size(&self) -> usize {
        self.out_size
    }

    pub fn variant(&self) -> &ModelVariant {
        &self.variant
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Returns the variant along with mutable access to the parameters, for training.
    pub fn split_mut(&mut self) -> (&ModelVariant, &mut [f32]) {
        (&self.variant, &mut self.params)
    }

    /// Returns the parameters split in one chunk per parameterized component.
    pub fn groups(&self) -> Vec<&[f32]> {
        let mut rest = self.params.as_slice();

        self.variant
            .groups()
            .into_iter()
            .map(|size| {
                let (head, tail) = rest.split_at(size);
                rest = tail;
                head
            })
            .collect()
    }

    /// The mutable counterpart of `groups`.
    pub fn groups_mut(&mut self) -> Vec<&mut [f32]> {
        let mut rest = self.params.as_mut_slice();

        self.variant
            .groups()
            .into_iter()
            .map(|size| {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(size);
                rest = tail;
                head
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{activations::ActFn, layers::Layer, recurrent::Cell};

    use super::*;

    fn rnn(dim: (usize, usize)) -> Network {
        let block = Block::new([Cell::vanilla(dim, ActFn::Tanh)]).unwrap();
        Network::new(ModelVariant::Recurrent(block), Some(1)).unwrap()
    }

    fn feed_forward(dim: (usize, usize)) -> Network {
        let net = Sequential::new([Layer::dense(dim, None)]).unwrap();
        Network::new(ModelVariant::FeedForward(net), Some(2)).unwrap()
    }

    #[test]
    fn bidirectional_mixer_width_must_match() {
        let res = Network::bidirectional(rnn((2, 3)), rnn((2, 2)), feed_forward((4, 1)));
        assert!(matches!(res, Err(CliErr::TypeMismatch { .. })));

        let net = Network::bidirectional(rnn((2, 3)), rnn((2, 2)), feed_forward((5, 1))).unwrap();
        assert_eq!((net.in_size(), net.out_size()), (2, 1));
        assert_eq!(net.params().len(), net.variant().size());
    }

    #[test]
    fn bidirectional_inputs_must_match() {
        let res = Network::bidirectional(rnn((2, 3)), rnn((3, 2)), feed_forward((5, 1)));
        assert!(matches!(res, Err(CliErr::TypeMismatch { .. })));
    }

    #[test]
    fn composition_checks_component_kinds() {
        let res = Network::bidirectional(feed_forward((2, 3)), rnn((2, 2)), feed_forward((5, 1)));
        assert!(matches!(res, Err(CliErr::TypeMismatch { what: "forward", .. })));

        let res = Network::seq_to_vec(rnn((2, 3)), rnn((3, 1)));
        assert!(matches!(res, Err(CliErr::TypeMismatch { what: "out net", .. })));
    }

    #[test]
    fn seq_to_vec_concatenates_parameters() {
        let (r, o) = (rnn((2, 3)), feed_forward((3, 1)));
        let expected = [r.params(), o.params()].concat();

        let net = Network::seq_to_vec(r, o).unwrap();
        assert_eq!(net.params(), expected);
        assert!(Network::seq_to_vec(rnn((2, 3)), feed_forward((2, 1))).is_err());
    }

    #[test]
    fn groups_partition_the_parameters() {
        let mut net = Network::seq_to_vec(rnn((2, 3)), feed_forward((3, 1))).unwrap();
        let sizes: Vec<usize> = net.groups().iter().map(|g| g.len()).collect();
        assert_eq!(sizes, [2 * 3 + 3 * 3 + 3, 3 + 1]);

        net.groups_mut()[1].fill(7.);
        assert_eq!(net.params()[18..], [7.; 4]);
    }

    #[test]
    fn artifacts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        let net = Network::bidirectional(rnn((2, 3)), rnn((2, 2)), feed_forward((5, 1))).unwrap();

        net.save(&path).unwrap();
        assert_eq!(Network::load(&path).unwrap(), net);
    }

    #[test]
    fn truncated_parameters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        let mut net = feed_forward((2, 1));
        net.params.pop();

        net.save(&path).unwrap();
        assert!(Network::load(&path).is_err());
    }
}
