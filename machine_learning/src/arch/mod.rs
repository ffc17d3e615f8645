pub mod activations;
pub mod layers;
pub mod loss;
pub mod recurrent;
mod sequential;

pub use sequential::{Sequential, SequentialTrace};
