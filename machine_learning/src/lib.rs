//! Numeric building blocks for small neural networks: feed-forward layers, recurrent blocks,
//! loss functions and optimizers, all working over flat parameter slices.

pub mod arch;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod params;

pub use error::{MlErr, Result};
