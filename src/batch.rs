use ndarray::{Array2, ArrayView1, Axis};

use crate::{CliErr, Result, stream::Vector};

/// Splits a flat vector into consecutive chunks of `chunk` components.
///
/// # Returns
/// The `vec.len() / chunk` chunks, or `BadLength` if the length isn't a multiple of `chunk`.
pub fn split(vec: &[f32], chunk: usize) -> Result<Vec<Vector>> {
    if chunk == 0 || vec.len() % chunk != 0 {
        return Err(CliErr::BadLength {
            op: "split",
            len: vec.len(),
            chunk,
        });
    }

    Ok(vec.chunks(chunk).map(<[f32]>::to_vec).collect())
}

/// Stacks equally long vectors as the rows of a matrix.
pub fn stack(vecs: &[Vector], width: usize) -> Result<Array2<f32>> {
    let mut out = Array2::zeros((vecs.len(), width));

    for (mut row, vec) in out.rows_mut().into_iter().zip(vecs) {
        if vec.len() != width {
            return Err(CliErr::BadLength {
                op: "stack",
                len: vec.len(),
                chunk: width,
            });
        }

        row.assign(&ArrayView1::from(vec.as_slice()));
    }

    Ok(out)
}

/// Splits the rows of a matrix back into vectors.
pub fn unstack(matrix: &Array2<f32>) -> Vec<Vector> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// A batch of sequences of possibly different lengths, evaluated in lockstep.
///
/// Step `t` holds one row per sequence; rows of sequences shorter than `t + 1` are zero and
/// must be ignored through the sequence lengths.
#[derive(Clone, Debug, PartialEq)]
pub struct SeqBatch {
    steps: Vec<Array2<f32>>,
    lens: Vec<usize>,
}

impl SeqBatch {
    /// Pads sequences of `width` wide steps into a batch.
    ///
    /// # Arguments
    /// * `seqs` - The sequences, each a list of steps.
    /// * `width` - The width of every step.
    pub fn from_seqs(seqs: &[Vec<Vector>], width: usize) -> Result<Self> {
        let lens: Vec<usize> = seqs.iter().map(Vec::len).collect();
        let max_len = lens.iter().copied().max().unwrap_or(0);
        let mut steps = vec![Array2::zeros((seqs.len(), width)); max_len];

        for (i, seq) in seqs.iter().enumerate() {
            for (t, step) in seq.iter().enumerate() {
                if step.len() != width {
                    return Err(CliErr::BadLength {
                        op: "assemble batch",
                        len: step.len(),
                        chunk: width,
                    });
                }

                steps[t]
                    .row_mut(i)
                    .assign(&ArrayView1::from(step.as_slice()));
            }
        }

        Ok(Self { steps, lens })
    }

    /// Splits flat records into `width` wide steps and pads them into a batch.
    pub fn from_flat(records: &[Vector], width: usize) -> Result<Self> {
        let seqs = records
            .iter()
            .map(|record| split(record, width))
            .collect::<Result<Vec<_>>>()?;

        Self::from_seqs(&seqs, width)
    }

    /// Returns the amount of sequences.
    pub fn len(&self) -> usize {
        self.lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lens.is_empty()
    }

    pub fn steps(&self) -> &[Array2<f32>] {
        &self.steps
    }

    pub fn lens(&self) -> &[usize] {
        &self.lens
    }

    /// Returns the amount of present (sequence, step) pairs.
    pub fn present(&self) -> usize {
        self.lens.iter().sum()
    }

    /// Returns the same batch with every sequence reversed in place, so that each one still
    /// starts at step 0.
    pub fn reversed(&self) -> Self {
        Self {
            steps: reverse_each(&self.steps, &self.lens),
            lens: self.lens.clone(),
        }
    }
}

/// Reverses every sequence of a list of padded steps within its own length.
///
/// Rows past a sequence's length come out as zeros.
pub fn reverse_each(steps: &[Array2<f32>], lens: &[usize]) -> Vec<Array2<f32>> {
    let mut out: Vec<Array2<f32>> = steps.iter().map(|s| Array2::zeros(s.raw_dim())).collect();

    for (i, &len) in lens.iter().enumerate() {
        for t in 0..len {
            out[t].row_mut(i).assign(&steps[len - 1 - t].row(i));
        }
    }

    out
}

/// Zeroes the rows of step `t` whose sequences have already ended.
pub fn mask_absent(step: &mut Array2<f32>, t: usize, lens: &[usize]) {
    for (mut row, &len) in step.rows_mut().into_iter().zip(lens) {
        if t >= len {
            row.fill(0.);
        }
    }
}

/// Joins every sequence's present steps into one flat vector per sequence.
pub fn unpack(steps: &[Array2<f32>], lens: &[usize]) -> Vec<Vector> {
    lens.iter()
        .enumerate()
        .map(|(i, &len)| {
            steps[..len]
                .iter()
                .flat_map(|step| step.row(i).to_vec())
                .collect()
        })
        .collect()
}

/// Gathers the last present step of every sequence.
///
/// # Returns
/// One row per sequence, or `BadLength` if a sequence is empty.
pub fn tail(steps: &[Array2<f32>], lens: &[usize]) -> Result<Array2<f32>> {
    let width = steps.first().map_or(0, |s| s.ncols());
    let mut out = Array2::zeros((lens.len(), width));

    for (i, &len) in lens.iter().enumerate() {
        if len == 0 {
            return Err(CliErr::BadLength {
                op: "sequence tail",
                len: 0,
                chunk: width,
            });
        }

        out.row_mut(i).assign(&steps[len - 1].row(i));
    }

    Ok(out)
}

/// Spreads per-sequence deltas back onto the last present step of each sequence.
pub fn untail(d: &Array2<f32>, lens: &[usize], n_steps: usize) -> Vec<Array2<f32>> {
    let mut out = vec![Array2::zeros(d.raw_dim()); n_steps];

    for (i, &len) in lens.iter().enumerate() {
        if len > 0 {
            out[len - 1].row_mut(i).assign(&d.index_axis(Axis(0), i));
        }
    }

    out
}

/// Groups the items of a fallible iterator into batches of up to `size` items.
///
/// A batch is yielded once full or when the source ends. When the source fails, the pending
/// partial batch is yielded first and the error right after it.
pub struct Batcher<I, T> {
    source: I,
    size: usize,
    pending: Option<CliErr>,
    done: bool,
    _item: std::marker::PhantomData<T>,
}

impl<I, T> Batcher<I, T>
where
    I: Iterator<Item = Result<T>>,
{
    pub fn new(source: I, size: usize) -> Self {
        Self {
            source,
            size: size.max(1),
            pending: None,
            done: false,
            _item: std::marker::PhantomData,
        }
    }
}

impl<I, T> Iterator for Batcher<I, T>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }

        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            match self.source.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    if batch.is_empty() {
                        return Some(Err(e));
                    }

                    self.pending = Some(e);
                    break;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        (!batch.is_empty()).then_some(Ok(batch))
    }
}
