mod activation;
mod dense;
mod layer;

pub use activation::Activation;
pub use dense::{Dense, DenseTrace};
pub use layer::{Layer, LayerTrace};
