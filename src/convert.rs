use std::{io::Write, num::NonZeroUsize};

use crate::{
    CliErr, Result,
    stream::{Vector, vec_str},
};

/// Maps every component to 1 if it's non-negative and to 0 otherwise.
pub fn signbit<I, W>(records: I, out: &mut W) -> Result<()>
where
    I: Iterator<Item = Result<Vector>>,
    W: Write,
{
    for record in records {
        let bits: Vector = record?
            .into_iter()
            .map(|x| if x >= 0. { 1. } else { 0. })
            .collect();
        writeln!(out, "{}", vec_str(&bits))?;
    }

    Ok(())
}

/// Writes the index of the largest component of every chunk of every record.
///
/// # Arguments
/// * `records` - The input records; empty ones are skipped.
/// * `vec_size` - The chunk width, the whole record if unset.
/// * `one_hot` - Whether to write one-hot vectors instead of indices.
/// * `out` - Where the outputs are written, one line per record.
pub fn max<I, W>(records: I, vec_size: Option<NonZeroUsize>, one_hot: bool, out: &mut W) -> Result<()>
where
    I: Iterator<Item = Result<Vector>>,
    W: Write,
{
    for record in records {
        let record = record?;
        if record.is_empty() {
            continue;
        }

        let chunk = vec_size.map_or(record.len(), NonZeroUsize::get);
        if record.len() % chunk != 0 {
            return Err(CliErr::BadLength {
                op: "max",
                len: record.len(),
                chunk,
            });
        }

        let parts: Vec<String> = record
            .chunks(chunk)
            .map(|sub| {
                let idx = arg_max(sub);
                if one_hot {
                    let mut hot = vec![0.; sub.len()];
                    hot[idx] = 1.;
                    vec_str(&hot)
                } else {
                    idx.to_string()
                }
            })
            .collect();

        writeln!(out, "{}", parts.join(" "))?;
    }

    Ok(())
}

/// Returns the index of the first largest component.
fn arg_max(vec: &[f32]) -> usize {
    let mut best = 0;

    for (i, &x) in vec.iter().enumerate() {
        if x > vec[best] {
            best = i;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::VecReader;

    fn convert(text: &str, f: impl FnOnce(crate::stream::VecChan, &mut Vec<u8>) -> Result<()>) -> String {
        let mut out = Vec::new();
        f(VecReader::from_text(text).into_chan(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn signbit_thresholds_at_zero() {
        let out = convert("-1 0 2.5\n\n", |r, o| signbit(r, o));
        assert_eq!(out, "0 1 1\n\n");
    }

    #[test]
    fn max_indexes_whole_records() {
        let out = convert("1 3 2\n\n5 5 1\n", |r, o| max(r, None, false, o));
        assert_eq!(out, "1\n0\n");
    }

    #[test]
    fn max_splits_into_chunks() {
        let size = NonZeroUsize::new(2);
        let out = convert("1 3 4 2\n", |r, o| max(r, size, true, o));
        assert_eq!(out, "0 1 1 0\n");

        let out = convert("1 3 4 2\n", |r, o| max(r, size, false, o));
        assert_eq!(out, "1 0\n");
    }

    #[test]
    fn max_rejects_uneven_records() {
        let records = VecReader::from_text("1 2 3\n").into_chan();
        let res = max(records, NonZeroUsize::new(2), false, &mut Vec::new());
        assert!(matches!(res, Err(CliErr::BadLength { len: 3, chunk: 2, .. })));
    }
}
