use std::time::Instant;

use crate::config::StopConfig;

/// Decides when training is over: after a deadline, once the cost drops below a threshold or
/// once enough samples were processed, whichever happens first.
///
/// Once it has decided to stop it keeps saying so.
#[derive(Debug, Clone)]
pub struct StopCondition {
    deadline: Option<Instant>,
    cost: Option<f32>,
    samples: Option<usize>,
    stopped: bool,
}

impl StopCondition {
    /// Creates a new `StopCondition`, starting the clock now.
    ///
    /// # Arguments
    /// * `config` - The limits; zero values leave a limit unset.
    ///
    /// # Returns
    /// A new `StopCondition` instance.
    pub fn new(config: &StopConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    pub fn starting_at(config: &StopConfig, start: Instant) -> Self {
        Self {
            deadline: config
                .time
                .filter(|t| !t.is_zero())
                .and_then(|t| start.checked_add(t)),
            cost: (config.cost > 0.).then_some(config.cost),
            samples: (config.samples > 0).then_some(config.samples),
            stopped: false,
        }
    }

    /// Checks the limits after a training step.
    ///
    /// # Arguments
    /// * `cost` - The last step's cost, if any step ran.
    /// * `samples` - The amount of samples processed so far.
    pub fn should_stop(&mut self, cost: Option<f32>, samples: usize) -> bool {
        self.should_stop_at(Instant::now(), cost, samples)
    }

    pub fn should_stop_at(&mut self, now: Instant, cost: Option<f32>, samples: usize) -> bool {
        if !self.stopped {
            let timed_out = self.deadline.is_some_and(|deadline| now >= deadline);
            let converged = matches!((self.cost, cost), (Some(limit), Some(cost)) if cost < limit);
            let exhausted = self.samples.is_some_and(|limit| samples > limit);

            self.stopped = timed_out || converged || exhausted;
        }

        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn sample_limit_is_exclusive() {
        let config = StopConfig {
            samples: 10,
            ..Default::default()
        };

        for cost in [None, Some(0.), Some(100.)] {
            for samples in 0..=10 {
                assert!(!StopCondition::new(&config).should_stop(cost, samples));
            }

            for samples in [11, 12, 1000] {
                assert!(StopCondition::new(&config).should_stop(cost, samples));
            }
        }
    }

    #[test]
    fn zero_cost_threshold_is_unset() {
        let mut stop = StopCondition::new(&StopConfig::default());
        assert!(!stop.should_stop(Some(-1.), usize::MAX));
    }

    #[test]
    fn negative_cost_threshold_is_unset() {
        let config = StopConfig {
            cost: -0.5,
            ..Default::default()
        };
        let mut stop = StopCondition::new(&config);

        assert!(!stop.should_stop(Some(-1.), 1));
        assert!(!stop.should_stop(Some(-100.), 2));
    }

    #[test]
    fn cost_threshold_needs_a_cost() {
        let config = StopConfig {
            cost: 0.5,
            ..Default::default()
        };
        let mut stop = StopCondition::new(&config);

        assert!(!stop.should_stop(None, 1));
        assert!(!stop.should_stop(Some(0.5), 2));
        assert!(stop.should_stop(Some(0.4), 3));
    }

    #[test]
    fn deadline_latches() {
        let start = Instant::now();
        let config = StopConfig {
            time: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let mut stop = StopCondition::starting_at(&config, start);

        assert!(!stop.should_stop_at(start + Duration::from_secs(59), None, 0));
        assert!(stop.should_stop_at(start + Duration::from_secs(60), None, 0));
        assert!(stop.should_stop_at(start, None, 0));
    }
}
