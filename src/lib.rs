//! Assemble, train and run small neural networks over text vector streams.

pub mod batch;
pub mod config;
pub mod convert;
pub mod description;
pub mod error;
pub mod network;
pub mod params;
pub mod run;
pub mod stream;
pub mod train;

pub use error::{CliErr, Result};
