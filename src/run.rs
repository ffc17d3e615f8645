use std::{io::Write, mem};

use log::debug;
use machine_learning::arch::recurrent::{Block, State};
use ndarray::ArrayView2;

use crate::{
    CliErr, Result,
    batch::{self, Batcher},
    config::RunConfig,
    network::{ModelVariant, Network},
    stream::{Vector, vec_str},
};

/// Runs every input record through the network, writing one output line per record.
///
/// # Arguments
/// * `network` - The network to run.
/// * `records` - The input records, as read from the vector stream.
/// * `config` - The batch size and whether recurrent state persists across records.
/// * `out` - Where the outputs are written.
pub fn run<I, W>(network: &Network, records: I, config: &RunConfig, out: &mut W) -> Result<()>
where
    I: Iterator<Item = Result<Vector>>,
    W: Write,
{
    config.validate()?;

    if config.persistent {
        let ModelVariant::Recurrent(block) = network.variant() else {
            return Err(CliErr::Config(format!(
                "--persistent needs an RNN, not {}",
                network.variant().kind()
            )));
        };

        let mut driver = PersistentRun::new(block, network.params(), network.in_size());
        for record in records {
            if let Some(output) = driver.feed(&record?)? {
                writeln!(out, "{}", vec_str(&output))?;
                out.flush()?;
            }
        }

        return Ok(());
    }

    let variant = network.variant();
    for records in Batcher::new(records, config.batch.get()) {
        let records = records?;
        debug!("evaluating a batch of {}", records.len());

        let input = variant.batch(&records)?;
        for output in variant.apply(network.params(), &input)? {
            writeln!(out, "{}", vec_str(&output))?;
        }

        out.flush()?;
    }

    Ok(())
}

enum Phase {
    Idle,
    Active(State),
}

/// Steps an RNN through consecutive records, carrying its state from one record to the next
/// until an empty record resets it.
pub struct PersistentRun<'n> {
    block: &'n Block,
    params: &'n [f32],
    in_size: usize,
    phase: Phase,
}

impl<'n> PersistentRun<'n> {
    pub fn new(block: &'n Block, params: &'n [f32], in_size: usize) -> Self {
        Self {
            block,
            params,
            in_size,
            phase: Phase::Idle,
        }
    }

    /// Whether a state is being carried.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active(_))
    }

    /// Feeds one record.
    ///
    /// # Returns
    /// The outputs of every step of the record, concatenated, or `None` for an empty record,
    /// which drops the carried state.
    pub fn feed(&mut self, record: &[f32]) -> Result<Option<Vector>> {
        if record.is_empty() {
            if self.is_active() {
                debug!("resetting recurrent state");
            }

            self.phase = Phase::Idle;
            return Ok(None);
        }

        let steps = batch::split(record, self.in_size)?;
        let mut state = match mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => self.block.start(1),
            Phase::Active(state) => state,
        };

        let mut output = Vec::with_capacity(steps.len() * self.block.out_size());
        for step in &steps {
            let x = ArrayView2::from_shape((1, step.len()), step)?;
            let (y, next) = self.block.step(self.params, &state, x)?;
            output.extend(y.iter());
            state = next;
        }

        self.phase = Phase::Active(state);
        Ok(Some(output))
    }
}
