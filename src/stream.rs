use std::{
    fs::File,
    io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom},
    path::Path,
    thread,
};

use log::{debug, warn};
use tokio::sync::mpsc::{self, Receiver};

use crate::{CliErr, Result};

/// A flat vector of components, one line of the input.
pub type Vector = Vec<f32>;

/// The byte source behind a `VecReader`.
pub enum Input {
    Stdin(io::Stdin),
    File(File),
    Memory(Cursor<Vec<u8>>),
    /// Any other source, which can't be restarted.
    Pipe(Box<dyn Read + Send>),
}

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Input::Stdin(r) => r.read(buf),
            Input::File(r) => r.read(buf),
            Input::Memory(r) => r.read(buf),
            Input::Pipe(r) => r.read(buf),
        }
    }
}

impl Seek for Input {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Input::File(f) => f.seek(pos),
            Input::Memory(c) => c.seek(pos),
            Input::Stdin(_) | Input::Pipe(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream cannot seek",
            )),
        }
    }
}

/// The two halves of a batch of training samples, `ins[i]` paired with `outs[i]`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Samples {
    pub ins: Vec<Vector>,
    pub outs: Vec<Vector>,
}

impl Samples {
    pub fn len(&self) -> usize {
        self.ins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ins.is_empty()
    }
}

/// Reads whitespace separated vectors, one per line.
pub struct VecReader {
    buf: BufReader<Input>,
    line: String,
}

impl VecReader {
    /// Creates a new `VecReader`.
    ///
    /// # Arguments
    /// * `input` - The source of the lines.
    ///
    /// # Returns
    /// A new `VecReader` instance.
    pub fn new(input: Input) -> Self {
        Self {
            buf: BufReader::new(input),
            line: String::new(),
        }
    }

    /// Opens a file, or the standard input when there's no path or the path is `-`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let input = match path {
            Some(path) if path != Path::new("-") => Input::File(File::open(path)?),
            _ => Input::Stdin(io::stdin()),
        };

        Ok(Self::new(input))
    }

    /// Creates a restartable reader over in-memory text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(Input::Memory(Cursor::new(text.into().into_bytes())))
    }

    /// Reads the next vector.
    ///
    /// # Returns
    /// The vector, which is empty for a blank line, `EndOfInput` when there are no more lines or
    /// `MalformedLine` if a field isn't a number.
    pub fn read(&mut self) -> Result<Vector> {
        self.line.clear();

        if self.buf.read_line(&mut self.line)? == 0 {
            return Err(CliErr::EndOfInput);
        }

        self.line
            .split_whitespace()
            .map(|field| {
                field.parse().map_err(|_| CliErr::MalformedLine {
                    op: "read vector",
                    value: field.to_string(),
                })
            })
            .collect()
    }

    /// Seeks back to the beginning of the input.
    ///
    /// # Returns
    /// `UnseekableRestart` if the underlying source can't seek.
    pub fn restart(&mut self) -> Result<()> {
        self.buf.seek(SeekFrom::Start(0)).map_err(|e| {
            debug!("restart failed: {e}");
            CliErr::UnseekableRestart
        })?;

        Ok(())
    }

    /// Reads an (input, output) training sample.
    ///
    /// If the input can't be read because the stream ended, the stream is restarted and the
    /// input is read once more. The output is never retried, so an odd trailing line can't shift
    /// the pairing of the following samples; it fails with `UnpairedSample` instead.
    pub fn read_pair(&mut self) -> Result<(Vector, Vector)> {
        let input = match self.read() {
            Err(CliErr::EndOfInput) => {
                self.restart()?;
                debug!("restarted the sample stream");
                self.read()?
            }
            res => res?,
        };

        let output = match self.read() {
            Err(CliErr::EndOfInput) => return Err(CliErr::UnpairedSample),
            res => res?,
        };

        Ok((input, output))
    }

    /// Reads up to `n` training samples.
    ///
    /// # Returns
    /// The samples read so far and the error that stopped the read, if any. The samples are
    /// meaningful even when there's an error.
    pub fn read_samples(&mut self, n: usize) -> (Samples, Option<CliErr>) {
        let mut samples = Samples::default();

        for _ in 0..n {
            match self.read_pair() {
                Ok((input, output)) => {
                    samples.ins.push(input);
                    samples.outs.push(output);
                }
                Err(e) => return (samples, Some(e)),
            }
        }

        (samples, None)
    }

    /// Moves the reader to a background thread that hands the vectors over one at a time.
    ///
    /// The channel holds at most one pending vector. It's closed once the input is exhausted;
    /// any other read error is forwarded as the last item.
    pub fn into_chan(mut self) -> VecChan {
        let (tx, rx) = mpsc::channel(1);

        thread::spawn(move || {
            loop {
                let item = match self.read() {
                    Err(CliErr::EndOfInput) => break,
                    item => item,
                };

                let fatal = item.is_err();
                if tx.blocking_send(item).is_err() {
                    warn!("vector consumer hung up");
                    break;
                }

                if fatal {
                    break;
                }
            }
        });

        VecChan { rx }
    }
}

/// The consuming end of `VecReader::into_chan`.
pub struct VecChan {
    rx: Receiver<Result<Vector>>,
}

impl Iterator for VecChan {
    type Item = Result<Vector>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.blocking_recv()
    }
}

/// Formats a vector as space separated components.
pub fn vec_str(vec: &[f32]) -> String {
    vec.iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_vectors_and_blank_lines() {
        let mut reader = VecReader::from_text("1 2.5  -3\n\n4e1");

        assert_eq!(reader.read().unwrap(), [1.0, 2.5, -3.0]);
        assert!(reader.read().unwrap().is_empty());
        assert_eq!(reader.read().unwrap(), [40.0]);
        assert!(matches!(reader.read(), Err(CliErr::EndOfInput)));
    }

    #[test]
    fn malformed_fields_are_reported() {
        let mut reader = VecReader::from_text("1 two 3\n");

        match reader.read() {
            Err(CliErr::MalformedLine { value, .. }) => assert_eq!(value, "two"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn odd_sample_file_restarts_from_the_top() {
        let mut reader = VecReader::from_text("1\n2\n3\n4\n5\n");

        assert_eq!(reader.read_pair().unwrap(), (vec![1.0], vec![2.0]));
        assert_eq!(reader.read_pair().unwrap(), (vec![3.0], vec![4.0]));
        // "5" has no output: reading it as an input is fine, but its output read fails.
        assert!(matches!(reader.read_pair(), Err(CliErr::UnpairedSample)));
        assert_eq!(reader.read_pair().unwrap(), (vec![1.0], vec![2.0]));
    }

    #[test]
    fn exhausted_even_file_restarts_on_the_next_pair() {
        let mut reader = VecReader::from_text("1\n2\n");

        let (samples, err) = reader.read_samples(3);
        assert!(err.is_none());
        assert_eq!(samples.ins, vec![vec![1.0]; 3]);
        assert_eq!(samples.outs, vec![vec![2.0]; 3]);
    }

    #[test]
    fn unseekable_streams_keep_the_partial_batch() {
        let input = Input::Pipe(Box::new(Cursor::new(b"1\n2\n3\n4\n".to_vec())));
        let mut reader = VecReader::new(input);

        let (samples, err) = reader.read_samples(3);
        assert_eq!(samples.len(), 2);
        assert!(matches!(err, Some(CliErr::UnseekableRestart)));
    }

    #[test]
    fn empty_seekable_stream_gives_up_after_one_restart() {
        let mut reader = VecReader::from_text("");
        assert!(matches!(reader.read_pair(), Err(CliErr::EndOfInput)));
    }

    #[test]
    fn channel_delivers_everything_then_closes() {
        let chan = VecReader::from_text("1 2\n3 4\n").into_chan();
        let vecs: Vec<_> = chan.map(|v| v.unwrap()).collect();
        assert_eq!(vecs, [vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn channel_forwards_fatal_errors() {
        let mut chan = VecReader::from_text("1\nx\n2\n").into_chan();
        assert_eq!(chan.next().unwrap().unwrap(), [1.0]);
        assert!(matches!(chan.next(), Some(Err(CliErr::MalformedLine { .. }))));
        assert!(chan.next().is_none());
    }

    #[test]
    fn formats_shortest_components() {
        assert_eq!(vec_str(&[1.0, 0.5, -2.25]), "1 0.5 -2.25");
        assert_eq!(vec_str(&[]), "");
    }
}
