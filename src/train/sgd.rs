use std::{num::NonZeroUsize, ops::ControlFlow};

use log::{debug, info};
use machine_learning::{arch::loss::LossFn, optimization::Optimizer};

use super::{Fetched, Fetcher};
use crate::{
    Result,
    network::{ModelVariant, TrainBatch},
};

/// What the status callback gets to see after every step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    pub steps: usize,
    pub processed: usize,
    pub cost: f32,
}

/// Online stochastic gradient descent over a network's parameters.
pub struct Sgd<'n, O, L>
where
    O: Optimizer,
    L: LossFn,
{
    variant: &'n ModelVariant,
    params: &'n mut [f32],
    optimizer: O,
    loss_fn: L,
    batch_size: NonZeroUsize,
    steps: usize,
    processed: usize,
}

impl<'n, O, L> Sgd<'n, O, L>
where
    O: Optimizer,
    L: LossFn,
{
    /// Creates a new `Sgd`.
    ///
    /// # Arguments
    /// * `variant` - The shape of the network being trained.
    /// * `params` - The network's parameters, updated in place.
    /// * `optimizer` - Turns every batch's gradient into a parameter update.
    /// * `loss_fn` - The cost function being minimized.
    /// * `batch_size` - The amount of samples per step.
    ///
    /// # Returns
    /// A new `Sgd` instance.
    pub fn new(
        variant: &'n ModelVariant,
        params: &'n mut [f32],
        optimizer: O,
        loss_fn: L,
        batch_size: NonZeroUsize,
    ) -> Self {
        Self {
            variant,
            params,
            optimizer,
            loss_fn,
            batch_size,
            steps: 0,
            processed: 0,
        }
    }

    /// Returns the amount of samples trained on so far.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Trains until the samples run out or `status` breaks.
    ///
    /// Every fetched batch is trained on, even a partial one that ended with an error. Running
    /// out of samples ends training successfully; any other fetch error is returned once its
    /// partial batch was trained on.
    ///
    /// # Arguments
    /// * `fetcher` - The source of the batches.
    /// * `status` - Called after every step; returning `ControlFlow::Break` stops training.
    pub fn run<F, S>(&mut self, fetcher: &mut F, mut status: S) -> Result<()>
    where
        F: Fetcher,
        S: FnMut(&Status) -> ControlFlow<()>,
    {
        loop {
            let Fetched { batch, err } = fetcher.fetch(self.batch_size.get());

            if let Some(batch) = batch {
                let cost = self.step(&batch)?;

                self.steps += 1;
                self.processed += batch.len();
                let snapshot = Status {
                    steps: self.steps,
                    processed: self.processed,
                    cost,
                };

                if status(&snapshot).is_break() {
                    debug!("stopped after {} steps", self.steps);
                    return Ok(());
                }
            } else if err.is_none() {
                return Ok(());
            }

            match err {
                None => {}
                Some(e) if e.is_exhaustion() => {
                    info!("ran out of samples after {} steps: {e}", self.steps);
                    return Ok(());
                }
                Some(e) => return Err(e),
            }
        }
    }

    fn step(&mut self, batch: &TrainBatch) -> Result<f32> {
        let mut grad = vec![0.; self.params.len()];
        let cost = self
            .variant
            .gradient(&*self.params, &mut grad, batch, &self.loss_fn)?;

        self.optimizer.update_params(&grad, &mut *self.params)?;
        Ok(cost)
    }
}
