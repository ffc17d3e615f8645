mod fetcher;
mod sgd;
mod stop;

pub use fetcher::{Fetched, Fetcher, SampleFetcher};
pub use sgd::{Sgd, Status};
pub use stop::StopCondition;

use std::ops::ControlFlow;

use log::info;

use crate::{Result, config::TrainConfig, network::Network, stream::VecReader};

/// Trains a network on the samples of a vector stream until they run out or a stop condition
/// is met.
///
/// # Arguments
/// * `network` - The network, whose parameters are updated in place.
/// * `reader` - The stream of alternating input and output lines.
/// * `config` - The training settings.
///
/// # Returns
/// The amount of samples trained on, or the error that interrupted training. The parameters
/// keep every update made before the error.
pub fn train(network: &mut Network, reader: VecReader, config: &TrainConfig) -> Result<usize> {
    let mut fetcher = SampleFetcher::new(reader, network.variant());
    let (variant, params) = network.split_mut();

    let optimizer = config.optimizer.build(params.len(), config.step);
    let loss_fn = config.loss.build();
    let mut stop = StopCondition::new(&config.stop);

    info!(
        "training {} with {} parameters, batch size {}",
        variant.kind(),
        params.len(),
        config.batch
    );

    let mut sgd = Sgd::new(variant, params, optimizer, loss_fn, config.batch);
    sgd.run(&mut fetcher, |status| {
        if !config.quiet {
            info!(
                "processed {} samples: cost={}",
                status.processed, status.cost
            );
        }

        if stop.should_stop(Some(status.cost), status.processed) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;

    Ok(sgd.processed())
}
