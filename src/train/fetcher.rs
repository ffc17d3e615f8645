use log::debug;

use crate::{
    CliErr, Result,
    batch::{self, SeqBatch},
    network::{ModelVariant, TrainBatch},
    stream::{Samples, VecReader},
};

/// The outcome of a fetch: whatever samples could be read, and why reading stopped early.
#[derive(Debug)]
pub struct Fetched {
    pub batch: Option<TrainBatch>,
    pub err: Option<CliErr>,
}

/// A source of training batches.
pub trait Fetcher {
    /// Fetches up to `n` samples.
    fn fetch(&mut self, n: usize) -> Fetched;
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Vectors,
    Sequences,
    SeqToVec,
}

/// Reads training samples from a vector stream and shapes them for a network variant.
pub struct SampleFetcher {
    reader: VecReader,
    shape: Shape,
    in_size: usize,
    out_size: usize,
}

impl SampleFetcher {
    pub fn new(reader: VecReader, variant: &ModelVariant) -> Self {
        let shape = match variant {
            ModelVariant::FeedForward(_) => Shape::Vectors,
            ModelVariant::Recurrent(_) | ModelVariant::Bidirectional { .. } => Shape::Sequences,
            ModelVariant::SeqToVec { .. } => Shape::SeqToVec,
        };

        Self {
            reader,
            shape,
            in_size: variant.in_size(),
            out_size: variant.out_size(),
        }
    }

    fn assemble(&self, samples: &Samples, n: usize) -> Result<TrainBatch> {
        let ins = &samples.ins[..n];
        let outs = &samples.outs[..n];

        let batch = match self.shape {
            Shape::Vectors => TrainBatch::Vectors {
                ins: batch::stack(ins, self.in_size)?,
                outs: batch::stack(outs, self.out_size)?,
            },
            Shape::Sequences => TrainBatch::Sequences {
                ins: SeqBatch::from_flat(ins, self.in_size)?,
                outs: SeqBatch::from_flat(outs, self.out_size)?,
            },
            Shape::SeqToVec => TrainBatch::SeqToVec {
                ins: SeqBatch::from_flat(ins, self.in_size)?,
                outs: batch::stack(outs, self.out_size)?,
            },
        };

        Ok(batch)
    }

    fn check(&self, input: &[f32], output: &[f32]) -> Result<()> {
        let bad = |len, chunk| CliErr::BadLength {
            op: "fetch sample",
            len,
            chunk,
        };

        match self.shape {
            Shape::Vectors => {
                if input.len() != self.in_size {
                    return Err(bad(input.len(), self.in_size));
                }
            }
            Shape::Sequences | Shape::SeqToVec => {
                if input.is_empty() || input.len() % self.in_size != 0 {
                    return Err(bad(input.len(), self.in_size));
                }
            }
        }

        let expected = match self.shape {
            Shape::Sequences => {
                let steps = input.len() / self.in_size;
                if output.len() % steps != 0 {
                    return Err(bad(output.len(), steps));
                }

                steps * self.out_size
            }
            Shape::Vectors | Shape::SeqToVec => self.out_size,
        };

        if output.len() != expected {
            return Err(bad(output.len(), self.out_size));
        }

        Ok(())
    }
}

impl Fetcher for SampleFetcher {
    fn fetch(&mut self, n: usize) -> Fetched {
        let (samples, mut err) = self.reader.read_samples(n);

        let mut valid = samples.len();
        for (i, (input, output)) in samples.ins.iter().zip(&samples.outs).enumerate() {
            if let Err(e) = self.check(input, output) {
                valid = i;
                err = Some(e);
                break;
            }
        }

        if valid == 0 {
            return Fetched { batch: None, err };
        }

        if let Some(e) = &err {
            debug!("fetched a partial batch of {valid}: {e}");
        }

        match self.assemble(&samples, valid) {
            Ok(batch) => Fetched {
                batch: Some(batch),
                err,
            },
            Err(e) => Fetched {
                batch: None,
                err: Some(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{
        Sequential,
        activations::ActFn,
        layers::Layer,
        recurrent::{Block, Cell},
    };

    use super::*;

    fn rnn() -> ModelVariant {
        ModelVariant::Recurrent(Block::new([Cell::vanilla((2, 1), ActFn::Tanh)]).unwrap())
    }

    #[test]
    fn feed_forward_samples_become_matrices() {
        let variant = ModelVariant::FeedForward(Sequential::new([Layer::dense((2, 1), None)]).unwrap());
        let mut fetcher = SampleFetcher::new(VecReader::from_text("1 2\n3\n4 5\n6\n"), &variant);

        let Fetched { batch, err } = fetcher.fetch(2);
        assert!(err.is_none());
        assert_eq!(batch.unwrap().len(), 2);
    }

    #[test]
    fn sequence_outputs_are_split_per_step() {
        let mut fetcher = SampleFetcher::new(VecReader::from_text("1 2 3 4\n0.5 0.25\n"), &rnn());

        match fetcher.fetch(1).batch {
            Some(TrainBatch::Sequences { ins, outs }) => {
                assert_eq!(ins.lens(), [2]);
                assert_eq!(outs.lens(), [2]);
                assert_eq!(outs.steps()[1][[0, 0]], 0.25);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_samples_keep_the_valid_prefix() {
        let text = "1 2\n1\n1 2 3\n1\n";
        let mut fetcher = SampleFetcher::new(VecReader::from_text(text), &rnn());

        let Fetched { batch, err } = fetcher.fetch(2);
        assert_eq!(batch.unwrap().len(), 1);
        assert!(matches!(err, Some(CliErr::BadLength { len: 3, chunk: 2, .. })));
    }

    #[test]
    fn seq_to_vec_outputs_stay_whole() {
        let variant = ModelVariant::SeqToVec {
            block: Block::new([Cell::vanilla((2, 3), ActFn::Tanh)]).unwrap(),
            out: Sequential::new([Layer::dense((3, 1), None)]).unwrap(),
        };
        let text = "1 2 3 4\n0.5\n1 2\n-1\n1 2 3 4\n1 1\n";
        let mut fetcher = SampleFetcher::new(VecReader::from_text(text), &variant);

        let Fetched { batch, err } = fetcher.fetch(3);
        match batch {
            Some(TrainBatch::SeqToVec { ins, outs }) => {
                assert_eq!(ins.lens(), [2, 1]);
                assert_eq!(outs.dim(), (2, 1));
                assert_eq!(outs[[1, 0]], -1.);
            }
            other => panic!("unexpected {other:?}"),
        }

        // One output per step is a sequence sample, not a sequence-to-vector one.
        assert!(matches!(err, Some(CliErr::BadLength { len: 2, chunk: 1, .. })));
    }

    #[test]
    fn mismatched_output_steps_are_rejected() {
        let mut fetcher = SampleFetcher::new(VecReader::from_text("1 2 3 4\n1 2 3\n"), &rnn());

        let Fetched { batch, err } = fetcher.fetch(1);
        assert!(batch.is_none());
        assert!(matches!(err, Some(CliErr::BadLength { len: 3, chunk: 2, .. })));
    }
}
