use machine_learning::arch::{Sequential, layers::Layer, recurrent::{Block, Cell}};
use serde::Deserialize;

use crate::{
    Result,
    network::{ModelVariant, Network},
};

/// A structured description of a new network.
///
/// ```json
/// {"feed_forward": {"layers": [{"dense": {"dim": [2, 4], "act_fn": "tanh"}},
///                              {"dense": {"dim": [4, 1]}}]}}
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Description {
    FeedForward { layers: Vec<Layer> },
    Recurrent { cells: Vec<Cell> },
}

impl Description {
    /// Parses a description from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Resolves the description into a network shape, checking that the widths chain.
    pub fn resolve(self) -> Result<ModelVariant> {
        let variant = match self {
            Description::FeedForward { layers } => ModelVariant::FeedForward(Sequential::new(layers)?),
            Description::Recurrent { cells } => ModelVariant::Recurrent(Block::new(cells)?),
        };

        Ok(variant)
    }

    /// Builds a freshly initialized network.
    pub fn build(self, seed: Option<u64>) -> Result<Network> {
        Network::new(self.resolve()?, seed)
    }
}
