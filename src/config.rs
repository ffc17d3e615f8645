use std::{num::NonZeroUsize, time::Duration};

use machine_learning::{
    arch::loss::{LossFn, Mse, SigmoidCe, SoftmaxCe},
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer},
};

use crate::{CliErr, Result};

/// Immutable settings of an inference run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub batch: NonZeroUsize,
    pub persistent: bool,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.persistent && self.batch.get() != 1 {
            return Err(CliErr::Config(
                "cannot combine --batch and --persistent".to_string(),
            ));
        }

        Ok(())
    }
}

/// Limits after which training stops. Zero values mean "unset".
#[derive(Debug, Clone, Default)]
pub struct StopConfig {
    pub time: Option<Duration>,
    pub cost: f32,
    pub samples: usize,
}

/// The cost function minimized while training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LossFnConfig {
    /// Cross-entropy over the softmax of the outputs.
    #[default]
    Softmax,
    /// Mean squared error.
    Mse,
    /// Cross-entropy over the sigmoid of every output.
    #[value(name = "sigmoidce")]
    SigmoidCe,
}

impl LossFnConfig {
    pub fn build(self) -> Box<dyn LossFn> {
        match self {
            LossFnConfig::Softmax => Box::new(SoftmaxCe::new()),
            LossFnConfig::Mse => Box::new(Mse::new()),
            LossFnConfig::SigmoidCe => Box::new(SigmoidCe::new()),
        }
    }
}

/// How raw gradients become parameter updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerConfig {
    GradientDescent,
    Momentum(f32),
    Adam { decay1: f32, decay2: f32 },
}

impl OptimizerConfig {
    /// Resolves the optimizer flags.
    ///
    /// # Arguments
    /// * `adam` - Either `default` or `RATE1,RATE2`, if Adam was requested.
    /// * `momentum` - The gradient descent momentum, zero for none.
    ///
    /// # Returns
    /// The optimizer configuration, or an error if both are given or the Adam rates can't be
    /// parsed.
    pub fn from_flags(adam: Option<&str>, momentum: f32) -> Result<Self> {
        let Some(adam) = adam else {
            return Ok(if momentum != 0. {
                OptimizerConfig::Momentum(momentum)
            } else {
                OptimizerConfig::GradientDescent
            });
        };

        if momentum != 0. {
            return Err(CliErr::Config(
                "cannot use Adam and momentum together".to_string(),
            ));
        }

        if adam == "default" {
            return Ok(OptimizerConfig::Adam {
                decay1: Adam::DECAY1,
                decay2: Adam::DECAY2,
            });
        }

        let bad = || CliErr::Config(format!("bad Adam parameters: {adam}"));
        let (rate1, rate2) = adam.split_once(',').ok_or_else(bad)?;

        Ok(OptimizerConfig::Adam {
            decay1: rate1.trim().parse().map_err(|_| bad())?,
            decay2: rate2.trim().parse().map_err(|_| bad())?,
        })
    }

    pub fn build(self, len: usize, learning_rate: f32) -> Box<dyn Optimizer> {
        match self {
            OptimizerConfig::GradientDescent => Box::new(GradientDescent::new(learning_rate)),
            OptimizerConfig::Momentum(momentum) => Box::new(GradientDescentWithMomentum::new(
                len,
                learning_rate,
                momentum,
            )),
            OptimizerConfig::Adam { decay1, decay2 } => Box::new(Adam::new(
                len,
                learning_rate,
                decay1,
                decay2,
                Adam::DAMPING,
            )),
        }
    }
}

/// Immutable settings of a training run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub step: f32,
    pub batch: NonZeroUsize,
    pub loss: LossFnConfig,
    pub optimizer: OptimizerConfig,
    pub stop: StopConfig,
    pub quiet: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            step: 0.001,
            batch: NonZeroUsize::MIN,
            loss: LossFnConfig::default(),
            optimizer: OptimizerConfig::GradientDescent,
            stop: StopConfig::default(),
            quiet: false,
        }
    }
}

/// Parses a duration such as `90s`, `1m30s`, `250ms` or `1.5h`.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let bad = || CliErr::Config(format!("invalid duration: {text:?}"));
    let text = text.trim();

    if text == "0" {
        return Ok(Duration::ZERO);
    } else if text.is_empty() {
        return Err(bad());
    }

    // in milliseconds
    let mut total = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(bad)?;
        let (number, tail) = rest.split_at(split);
        let value: f64 = number.parse().map_err(|_| bad())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ms" => 1.,
            "s" => 1e3,
            "m" => 60e3,
            "h" => 3600e3,
            _ => return Err(bad()),
        };

        total += value * scale;
        rest = tail;
    }

    Ok(Duration::from_secs_f64(total / 1e3))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);

        for bad in ["", "10", "s", "5x", "1.2.3s"] {
            assert!(parse_duration(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn resolves_optimizers() {
        assert_eq!(
            OptimizerConfig::from_flags(None, 0.).unwrap(),
            OptimizerConfig::GradientDescent
        );
        assert_eq!(
            OptimizerConfig::from_flags(None, 0.9).unwrap(),
            OptimizerConfig::Momentum(0.9)
        );
        assert_eq!(
            OptimizerConfig::from_flags(Some("0.8,0.99"), 0.).unwrap(),
            OptimizerConfig::Adam {
                decay1: 0.8,
                decay2: 0.99
            }
        );
        assert!(matches!(
            OptimizerConfig::from_flags(Some("default"), 0.).unwrap(),
            OptimizerConfig::Adam { .. }
        ));
    }

    #[test]
    fn rejects_conflicting_optimizers() {
        assert!(OptimizerConfig::from_flags(Some("default"), 0.9).is_err());
        assert!(OptimizerConfig::from_flags(Some("0.9"), 0.).is_err());
        assert!(OptimizerConfig::from_flags(Some("a,b"), 0.).is_err());
    }

    #[test]
    fn persistent_runs_need_unit_batches() {
        let config = RunConfig {
            batch: NonZeroUsize::new(4).unwrap(),
            persistent: true,
        };
        assert!(config.validate().is_err());
    }
}
