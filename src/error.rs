use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The result type used across the command line tool.
pub type Result<T> = std::result::Result<T, CliErr>;

/// Everything that can go wrong while reading vectors, composing networks, running or training
/// them.
#[derive(Debug)]
pub enum CliErr {
    /// The vector stream has no more lines.
    EndOfInput,
    MalformedLine {
        op: &'static str,
        value: String,
    },
    BadLength {
        op: &'static str,
        len: usize,
        chunk: usize,
    },
    TypeMismatch {
        what: &'static str,
        expected: String,
        got: String,
    },
    /// A sample pairing had to be resynchronized but the stream can't seek back.
    UnseekableRestart,
    /// The input of a training sample isn't followed by its output.
    UnpairedSample,
    Config(String),
    Io(io::Error),
    Ml(MlErr),
    Artifact(serde_json::Error),
}

impl CliErr {
    /// Whether this error marks a natural end of the training samples rather than a failure.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, CliErr::EndOfInput | CliErr::UnseekableRestart)
    }
}

impl fmt::Display for CliErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliErr::EndOfInput => write!(f, "end of input"),
            CliErr::MalformedLine { op, value } => {
                write!(f, "{op}: cannot parse {value:?} as a number")
            }
            CliErr::BadLength { op, len, chunk } => {
                write!(f, "{op}: length {len} is not valid for a chunk size of {chunk}")
            }
            CliErr::TypeMismatch {
                what,
                expected,
                got,
            } => write!(f, "{what} should be {expected} (not {got})"),
            CliErr::UnseekableRestart => write!(f, "end of unseekable stream"),
            CliErr::UnpairedSample => write!(f, "read sample: input has no matching output"),
            CliErr::Config(e) => write!(f, "{e}"),
            CliErr::Io(e) => write!(f, "io error: {e}"),
            CliErr::Ml(e) => write!(f, "{e}"),
            CliErr::Artifact(e) => write!(f, "invalid network file: {e}"),
        }
    }
}

impl Error for CliErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CliErr::Io(e) => Some(e),
            CliErr::Ml(e) => Some(e),
            CliErr::Artifact(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CliErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for CliErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<ndarray::ShapeError> for CliErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Ml(MlErr::Shape(value))
    }
}

impl From<serde_json::Error> for CliErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Artifact(value)
    }
}
