use machine_learning::{
    arch::{
        Sequential, SequentialTrace,
        loss::LossFn,
        recurrent::{Block, BlockTrace},
    },
    params::{GradIter, ParamIter},
};
use ndarray::{Array2, Axis, concatenate, s};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    CliErr, Result,
    batch::{self, SeqBatch},
    stream::Vector,
};

/// The four executable network shapes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Maps independent vectors.
    FeedForward(Sequential),
    /// Maps a sequence to a sequence of the same length.
    Recurrent(Block),
    /// Runs `forward` left to right and `backward` right to left, then maps every step's joined
    /// outputs through `mixer`.
    Bidirectional {
        forward: Block,
        backward: Block,
        mixer: Sequential,
    },
    /// Maps the last output of `block` through `out`.
    SeqToVec { block: Block, out: Sequential },
}

/// A batch of inputs shaped for a given variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Batch {
    Vectors(Array2<f32>),
    Sequences(SeqBatch),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Batch::Vectors(x) => x.nrows(),
            Batch::Sequences(seqs) => seqs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch of training samples, inputs shaped for a given variant along with their targets.
#[derive(Clone, Debug, PartialEq)]
pub enum TrainBatch {
    Vectors { ins: Array2<f32>, outs: Array2<f32> },
    Sequences { ins: SeqBatch, outs: SeqBatch },
    SeqToVec { ins: SeqBatch, outs: Array2<f32> },
}

impl TrainBatch {
    pub fn len(&self) -> usize {
        match self {
            TrainBatch::Vectors { ins, .. } => ins.nrows(),
            TrainBatch::Sequences { ins, .. } | TrainBatch::SeqToVec { ins, .. } => ins.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelVariant {
    /// Returns the variant's name, as used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ModelVariant::FeedForward(_) => "a feed-forward network",
            ModelVariant::Recurrent(_) => "an RNN",
            ModelVariant::Bidirectional { .. } => "a bidirectional RNN",
            ModelVariant::SeqToVec { .. } => "a sequence-to-vector RNN",
        }
    }

    /// Whether the variant consumes sequences rather than independent vectors.
    pub fn is_sequential(&self) -> bool {
        !matches!(self, ModelVariant::FeedForward(_))
    }

    /// Checks every component and the widths where components meet.
    pub fn validate(&self) -> Result<()> {
        match self {
            ModelVariant::FeedForward(net) => net.validate()?,
            ModelVariant::Recurrent(block) => block.validate()?,
            ModelVariant::Bidirectional {
                forward,
                backward,
                mixer,
            } => {
                forward.validate()?;
                backward.validate()?;
                mixer.validate()?;
                check_width(
                    "mixer input size",
                    forward.out_size() + backward.out_size(),
                    mixer.in_size(),
                )?;
                check_width("backward input size", forward.in_size(), backward.in_size())?;
            }
            ModelVariant::SeqToVec { block, out } => {
                block.validate()?;
                out.validate()?;
                check_width("out net input size", block.out_size(), out.in_size())?;
            }
        }

        Ok(())
    }

    pub fn in_size(&self) -> usize {
        match self {
            ModelVariant::FeedForward(net) => net.in_size(),
            ModelVariant::Recurrent(block) => block.in_size(),
            ModelVariant::Bidirectional { forward, .. } => forward.in_size(),
            ModelVariant::SeqToVec { block, .. } => block.in_size(),
        }
    }

    pub fn out_size(&self) -> usize {
        match self {
            ModelVariant::FeedForward(net) => net.out_size(),
            ModelVariant::Recurrent(block) => block.out_size(),
            ModelVariant::Bidirectional { mixer, .. } => mixer.out_size(),
            ModelVariant::SeqToVec { out, .. } => out.out_size(),
        }
    }

    /// Returns the amount of parameters of the whole model.
    pub fn size(&self) -> usize {
        self.groups().iter().sum()
    }

    /// Returns the parameter count of every parameterized component, in storage order.
    pub fn groups(&self) -> Vec<usize> {
        match self {
            ModelVariant::FeedForward(net) => net.groups(),
            ModelVariant::Recurrent(block) => block.groups(),
            ModelVariant::Bidirectional {
                forward,
                backward,
                mixer,
            } => [forward.groups(), backward.groups(), mixer.groups()].concat(),
            ModelVariant::SeqToVec { block, out } => [block.groups(), out.groups()].concat(),
        }
    }

    pub fn init<R: Rng>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let mut front = GradIter::new(params);

        match self {
            ModelVariant::FeedForward(net) => net.init(front.take(net.size())?, rng)?,
            ModelVariant::Recurrent(block) => block.init(front.take(block.size())?, rng)?,
            ModelVariant::Bidirectional {
                forward,
                backward,
                mixer,
            } => {
                forward.init(front.take(forward.size())?, rng)?;
                backward.init(front.take(backward.size())?, rng)?;
                mixer.init(front.take(mixer.size())?, rng)?;
            }
            ModelVariant::SeqToVec { block, out } => {
                block.init(front.take(block.size())?, rng)?;
                out.init(front.take(out.size())?, rng)?;
            }
        }

        Ok(())
    }

    /// Shapes raw input records the way this variant consumes them.
    ///
    /// # Returns
    /// `BadLength` if a record doesn't fit the input width, or is an empty sequence for a
    /// sequence-to-vector model.
    pub fn batch(&self, records: &[Vector]) -> Result<Batch> {
        let width = self.in_size();

        match self {
            ModelVariant::FeedForward(_) => Ok(Batch::Vectors(batch::stack(records, width)?)),
            ModelVariant::SeqToVec { .. } if records.iter().any(Vec::is_empty) => {
                Err(CliErr::BadLength {
                    op: "sequence input",
                    len: 0,
                    chunk: width,
                })
            }
            _ => Ok(Batch::Sequences(SeqBatch::from_flat(records, width)?)),
        }
    }

    /// Applies the model to a batch.
    ///
    /// # Returns
    /// One flat output per input record; sequence outputs are the concatenation of their steps.
    pub fn apply(&self, params: &[f32], input: &Batch) -> Result<Vec<Vector>> {
        match (self, input) {
            (ModelVariant::FeedForward(net), Batch::Vectors(x)) => {
                Ok(batch::unstack(&net.apply(params, x.view())?))
            }
            (ModelVariant::Recurrent(block), Batch::Sequences(seqs)) => {
                let (outs, _) = block.forward(params, seqs.len(), seqs.steps())?;
                Ok(batch::unpack(&outs, seqs.lens()))
            }
            (ModelVariant::Bidirectional { .. }, Batch::Sequences(seqs)) => {
                let (ys, _) = self.bidir_forward(params, seqs)?;
                Ok(batch::unpack(&ys, seqs.lens()))
            }
            (ModelVariant::SeqToVec { block, out }, Batch::Sequences(seqs)) => {
                let mut front = ParamIter::new(params);
                let block_params = front.take(block.size())?;
                let (outs, _) = block.forward(block_params, seqs.len(), seqs.steps())?;
                let last = batch::tail(&outs, seqs.lens())?;
                Ok(batch::unstack(&out.apply(front.take(out.size())?, last.view())?))
            }
            (variant, other) => Err(batch_mismatch(variant, other.len())),
        }
    }

    /// Computes the batch's cost and accumulates its gradient onto `grad`.
    ///
    /// Vector costs are averaged over samples and sequence costs over every present time-step.
    ///
    /// # Returns
    /// The average cost.
    pub fn gradient<L: LossFn + ?Sized>(
        &self,
        params: &[f32],
        grad: &mut [f32],
        samples: &TrainBatch,
        loss: &L,
    ) -> Result<f32> {
        match (self, samples) {
            (ModelVariant::FeedForward(net), TrainBatch::Vectors { ins, outs }) => {
                let (y, trace) = net.forward(params, ins.view())?;
                let (cost, d) = vector_cost(loss, &y, outs);
                net.backward(params, grad, &trace, d)?;
                Ok(cost)
            }
            (ModelVariant::Recurrent(block), TrainBatch::Sequences { ins, outs }) => {
                let (ys, trace) = block.forward(params, ins.len(), ins.steps())?;
                let (cost, ds) = sequence_cost(loss, &ys, outs)?;
                block.backward(params, grad, &trace, ds)?;
                Ok(cost)
            }
            (ModelVariant::Bidirectional { .. }, TrainBatch::Sequences { ins, outs }) => {
                let (ys, trace) = self.bidir_forward(params, ins)?;
                let (cost, ds) = sequence_cost(loss, &ys, outs)?;
                self.bidir_backward(params, grad, ins, &trace, ds)?;
                Ok(cost)
            }
            (ModelVariant::SeqToVec { block, out }, TrainBatch::SeqToVec { ins, outs }) => {
                let mut front = ParamIter::new(params);
                let block_params = front.take(block.size())?;
                let out_params = front.take(out.size())?;
                let mut grad_front = GradIter::new(grad);
                let block_grad = grad_front.take(block.size())?;
                let out_grad = grad_front.take(out.size())?;

                let (hs, trace) = block.forward(block_params, ins.len(), ins.steps())?;
                let last = batch::tail(&hs, ins.lens())?;
                let (y, out_trace) = out.forward(out_params, last.view())?;
                let (cost, d) = vector_cost(loss, &y, outs);

                let d_last = out.backward(out_params, out_grad, &out_trace, d)?;
                let ds = batch::untail(&d_last, ins.lens(), hs.len());
                block.backward(block_params, block_grad, &trace, ds)?;
                Ok(cost)
            }
            (variant, other) => Err(batch_mismatch(variant, other.len())),
        }
    }

    fn bidir_forward(&self, params: &[f32], seqs: &SeqBatch) -> Result<(Vec<Array2<f32>>, BidirTrace)> {
        let ModelVariant::Bidirectional {
            forward,
            backward,
            mixer,
        } = self
        else {
            return Err(batch_mismatch(self, seqs.len()));
        };

        let mut front = ParamIter::new(params);
        let forward_params = front.take(forward.size())?;
        let backward_params = front.take(backward.size())?;
        let mixer_params = front.take(mixer.size())?;
        let n = seqs.len();

        let (fs, forward_trace) = forward.forward(forward_params, n, seqs.steps())?;
        let reversed = seqs.reversed();
        let (bs, backward_trace) = backward.forward(backward_params, n, reversed.steps())?;
        let bs = batch::reverse_each(&bs, seqs.lens());

        let mut ys = Vec::with_capacity(fs.len());
        let mut mixer_traces = Vec::with_capacity(fs.len());
        for (f, b) in fs.iter().zip(&bs) {
            let joined = concatenate(Axis(1), &[f.view(), b.view()])?;
            let (y, trace) = mixer.forward(mixer_params, joined.view())?;
            ys.push(y);
            mixer_traces.push(trace);
        }

        let trace = BidirTrace {
            forward: forward_trace,
            backward: backward_trace,
            mixer: mixer_traces,
        };

        Ok((ys, trace))
    }

    fn bidir_backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        seqs: &SeqBatch,
        trace: &BidirTrace,
        ds: Vec<Array2<f32>>,
    ) -> Result<()> {
        let ModelVariant::Bidirectional {
            forward,
            backward,
            mixer,
        } = self
        else {
            return Err(batch_mismatch(self, seqs.len()));
        };

        let mut front = ParamIter::new(params);
        let forward_params = front.take(forward.size())?;
        let backward_params = front.take(backward.size())?;
        let mixer_params = front.take(mixer.size())?;
        let mut grad_front = GradIter::new(grad);
        let forward_grad = grad_front.take(forward.size())?;
        let backward_grad = grad_front.take(backward.size())?;
        let mixer_grad = grad_front.take(mixer.size())?;

        let split_at = forward.out_size();
        let mut d_fs = Vec::with_capacity(ds.len());
        let mut d_bs = Vec::with_capacity(ds.len());

        for (d, mixer_trace) in ds.into_iter().zip(&trace.mixer) {
            let d_joined = mixer.backward(mixer_params, mixer_grad, mixer_trace, d)?;
            d_fs.push(d_joined.slice(s![.., ..split_at]).to_owned());
            d_bs.push(d_joined.slice(s![.., split_at..]).to_owned());
        }

        let d_bs = batch::reverse_each(&d_bs, seqs.lens());
        forward.backward(forward_params, forward_grad, &trace.forward, d_fs)?;
        backward.backward(backward_params, backward_grad, &trace.backward, d_bs)?;
        Ok(())
    }
}

struct BidirTrace {
    forward: BlockTrace,
    backward: BlockTrace,
    mixer: Vec<SequentialTrace>,
}

fn check_width(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(CliErr::TypeMismatch {
            what,
            expected: expected.to_string(),
            got: got.to_string(),
        });
    }

    Ok(())
}

fn batch_mismatch(variant: &ModelVariant, len: usize) -> CliErr {
    CliErr::TypeMismatch {
        what: "batch",
        expected: format!("shaped for {}", variant.kind()),
        got: format!("a differently shaped batch of {len}"),
    }
}

/// Averages a vector batch's cost over its samples.
fn vector_cost<L: LossFn + ?Sized>(
    loss: &L,
    y_pred: &Array2<f32>,
    y: &Array2<f32>,
) -> (f32, Array2<f32>) {
    let n = y_pred.nrows().max(1) as f32;
    let cost = loss.loss(y_pred.view(), y.view()).sum() / n;
    let d = loss.loss_prime(y_pred.view(), y.view()) / n;
    (cost, d)
}

/// Averages a sequence batch's cost over its present time-steps, leaving absent steps out of
/// both the cost and the deltas.
fn sequence_cost<L: LossFn + ?Sized>(
    loss: &L,
    ys: &[Array2<f32>],
    targets: &SeqBatch,
) -> Result<(f32, Vec<Array2<f32>>)> {
    if ys.len() != targets.steps().len() {
        return Err(CliErr::BadLength {
            op: "sequence targets",
            len: targets.steps().len(),
            chunk: ys.len(),
        });
    }

    let lens = targets.lens();
    let present = targets.present().max(1) as f32;
    let mut cost = 0.;
    let mut ds = Vec::with_capacity(ys.len());

    for (t, (y_pred, y)) in ys.iter().zip(targets.steps()).enumerate() {
        let step_costs = loss.loss(y_pred.view(), y.view());
        cost += step_costs
            .iter()
            .zip(lens)
            .filter(|&(_, &len)| t < len)
            .map(|(c, _)| c)
            .sum::<f32>();

        let mut d = loss.loss_prime(y_pred.view(), y.view()) / present;
        batch::mask_absent(&mut d, t, lens);
        ds.push(d);
    }

    Ok((cost / present, ds))
}
