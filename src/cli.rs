use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use neural_network_cli::config::{
    LossFnConfig, OptimizerConfig, RunConfig, StopConfig, TrainConfig, parse_duration,
};

/// Build, train and run neural networks on whitespace separated vectors.
#[derive(Parser, Debug)]
#[command(name = "neurocli")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new network file from a JSON description
    New(NewArgs),
    /// Join two RNNs and a mixer network into a bidirectional RNN
    Bidir(BidirArgs),
    /// Join an RNN and an output network into a sequence-to-vector RNN
    Seq2vec(Seq2VecArgs),
    /// Train a network on data
    Train(TrainArgs),
    /// Run new samples through a network
    Run(RunArgs),
    /// Print a network's parameters, one group per line
    Read(ReadArgs),
    /// Replace a network's parameters, one group per line
    Write(WriteArgs),
    /// Map every component to 1 if non-negative, else 0
    Signbit(InArgs),
    /// Print the index of the largest component
    Max(MaxArgs),
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Network description file (stdin used by default)
    #[arg(long = "in")]
    pub input: Option<PathBuf>,

    /// Output network file
    #[arg(long)]
    pub out: PathBuf,

    /// Seed for the initial parameters
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct BidirArgs {
    /// Forward RNN file
    #[arg(long)]
    pub forward: PathBuf,

    /// Backward RNN file
    #[arg(long)]
    pub backward: PathBuf,

    /// Mixer feed-forward network file
    #[arg(long)]
    pub mixer: PathBuf,

    /// Output file
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct Seq2VecArgs {
    /// RNN file
    #[arg(long)]
    pub rnn: PathBuf,

    /// Feed-forward network file
    #[arg(long)]
    pub outnet: PathBuf,

    /// Output file
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Neural network file
    #[arg(long)]
    pub net: PathBuf,

    /// Training samples file (stdin used by default), alternating input and output lines
    #[arg(long)]
    pub samples: Option<PathBuf>,

    /// Adam optimizer parameters ('default' or 'RATE1,RATE2')
    #[arg(long)]
    pub adam: Option<String>,

    /// SGD momentum
    #[arg(long, default_value_t = 0.)]
    pub momentum: f32,

    /// SGD step size
    #[arg(long, default_value_t = 0.001)]
    pub step: f32,

    /// SGD batch size
    #[arg(long, default_value = "1")]
    pub batch: NonZeroUsize,

    /// Cost function
    #[arg(long, value_enum, default_value_t = LossFnConfig::Softmax)]
    pub cost: LossFnConfig,

    /// Stop after a timeout, such as 90s or 1m30s
    #[arg(long, value_parser = parse_duration)]
    pub stoptime: Option<Duration>,

    /// Stop after the cost goes below a threshold
    #[arg(long, default_value_t = 0.)]
    pub stopcost: f32,

    /// Stop after n training samples
    #[arg(long, default_value_t = 0)]
    pub stopsamples: usize,

    /// Quiet mode
    #[arg(short, long)]
    pub quiet: bool,
}

impl TrainArgs {
    pub fn config(&self) -> neural_network_cli::Result<TrainConfig> {
        Ok(TrainConfig {
            step: self.step,
            batch: self.batch,
            loss: self.cost,
            optimizer: OptimizerConfig::from_flags(self.adam.as_deref(), self.momentum)?,
            stop: StopConfig {
                time: self.stoptime,
                cost: self.stopcost,
                samples: self.stopsamples,
            },
            quiet: self.quiet,
        })
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input network file
    #[arg(long)]
    pub net: PathBuf,

    /// Input file (stdin used by default)
    #[arg(long = "in")]
    pub input: Option<PathBuf>,

    /// Persist RNN state until an empty line
    #[arg(long)]
    pub persistent: bool,

    /// Evaluation batch size
    #[arg(long, default_value = "1")]
    pub batch: NonZeroUsize,
}

impl RunArgs {
    pub fn config(&self) -> RunConfig {
        RunConfig {
            batch: self.batch,
            persistent: self.persistent,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Network file
    #[arg(long)]
    pub net: PathBuf,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Network file
    #[arg(long)]
    pub net: PathBuf,

    /// Input file (stdin used by default)
    #[arg(long = "in")]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InArgs {
    /// Input file (stdin used by default)
    #[arg(long = "in")]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MaxArgs {
    /// Input file (stdin used by default)
    #[arg(long = "in")]
    pub input: Option<PathBuf>,

    /// Output a one-hot vector instead of an index
    #[arg(long)]
    pub onehot: bool,

    /// Size per vector (the whole line by default)
    #[arg(long)]
    pub vecsize: Option<NonZeroUsize>,
}
