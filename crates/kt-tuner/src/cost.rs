//! Cost evaluation: snapping, legality, deduplication and runner dispatch.

use std::slice;
use tracing::{debug, info, trace, warn};

use kt_types::{Configuration, Environment, EvaluationResult};

use crate::runner::{Runner, StopReason};
use crate::session::TuningSession;
use crate::space::SearchSpace;

/// Score assigned to illegal or failed configurations.
pub const SENTINEL_SCORE: f64 = 1e20;

/// A point proposed by a strategy.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'c> {
    /// Continuous vector, snapped onto the space before evaluation.
    Point(&'c [f64]),
    Config(&'c Configuration),
}

/// Turns candidates into scores for one session.
pub struct CostEvaluator<'a> {
    space: &'a SearchSpace,
    runner: &'a mut dyn Runner,
    session: &'a mut TuningSession,
}

impl<'a> CostEvaluator<'a> {
    pub fn new(
        space: &'a SearchSpace,
        runner: &'a mut dyn Runner,
        session: &'a mut TuningSession,
    ) -> Self {
        Self {
            space,
            runner,
            session,
        }
    }

    pub fn space(&self) -> &SearchSpace {
        self.space
    }

    pub fn session(&self) -> &TuningSession {
        self.session
    }

    /// Unique configurations evaluated so far.
    pub fn fevals(&self) -> usize {
        self.session.fevals()
    }

    /// Whether every legal configuration has been evaluated.
    pub fn space_covered(&self) -> bool {
        self.fevals() >= self.space.size()
    }

    pub fn environment(&self) -> Environment {
        self.runner.environment()
    }

    /// Map a candidate onto a concrete configuration.
    pub fn resolve(&self, candidate: Candidate<'_>) -> Configuration {
        match candidate {
            Candidate::Config(config) => config.clone(),
            Candidate::Point(point) if self.session.context.scaling => {
                self.space.snap(&self.space.unscale(point))
            }
            Candidate::Point(point) => self.space.snap(point),
        }
    }

    /// Score a candidate, lower is better.
    ///
    /// With `check_restrictions` off the caller guarantees the candidate is
    /// legal. A stop raised by the runner is returned as `Err` after any
    /// measurements delivered with it have been recorded.
    pub fn evaluate(
        &mut self,
        candidate: Candidate<'_>,
        check_restrictions: bool,
    ) -> Result<f64, StopReason> {
        let config = self.resolve(candidate);

        if check_restrictions && !self.space.is_legal(&config) {
            self.session.counters.illegal_rejections += 1;
            trace!("Rejected illegal configuration {}", config);
            return Ok(SENTINEL_SCORE);
        }
        debug_assert!(
            self.space.is_legal(&config),
            "unchecked candidate {config} is illegal"
        );

        if let Some(time) = self.session.cache().get(&config).map(|r| r.time) {
            self.session.counters.cache_hits += 1;
            return Ok(time.unwrap_or(SENTINEL_SCORE));
        }

        self.session.counters.runner_calls += 1;
        let report = self.runner.run(
            slice::from_ref(&config),
            &self.session.kernel,
            &self.session.context,
        );

        let names = self.space.names();
        let measurement = report
            .measurements
            .into_iter()
            .find(|m| m.configuration == config);

        let score = match measurement {
            Some(measurement) => {
                let time = measurement.time;
                self.session
                    .record(EvaluationResult::measured(measurement, names));
                self.log_evaluation(&config, Some(time));
                time
            }
            None if report.stop.is_none() => {
                self.session
                    .record(EvaluationResult::failed(config.clone(), names));
                self.log_evaluation(&config, None);
                SENTINEL_SCORE
            }
            None => SENTINEL_SCORE,
        };

        match report.stop {
            Some(reason) => {
                warn!("Runner requested stop: {}", reason);
                Err(reason)
            }
            None => Ok(score),
        }
    }

    fn log_evaluation(&self, config: &Configuration, time: Option<f64>) {
        let fevals = self.fevals();
        let outcome = match time {
            Some(t) => format!("{t:.4}"),
            None => "failed".to_string(),
        };
        if self.session.context.verbose {
            info!("[{}] {} -> {}", fevals, config, outcome);
        } else {
            debug!("[{}] {} -> {}", fevals, config, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{FnRunner, KernelContext, RunReport, TuningContext};
    use crate::space::ParameterDomain;
    use kt_types::{Measurement, ParamValue};

    fn sample_space() -> SearchSpace {
        SearchSpace::new(
            vec![
                ParameterDomain::new("block_x", [32i64, 64, 128]),
                ParameterDomain::new("block_y", [4i64, 8, 16]),
            ],
            &["block_x * block_y <= 512".to_string()],
        )
        .unwrap()
    }

    fn session(space: &SearchSpace) -> TuningSession {
        TuningSession::new(space.names().to_vec(), KernelContext::default())
    }

    fn config(x: i64, y: i64) -> Configuration {
        Configuration::new(vec![ParamValue::Int(x), ParamValue::Int(y)])
    }

    fn time_of(c: &Configuration) -> Option<f64> {
        let x = c.values()[0].as_f64()?;
        let y = c.values()[1].as_f64()?;
        if y == 16.0 {
            None
        } else {
            Some(x / y)
        }
    }

    #[test]
    fn illegal_candidates_never_reach_the_runner() {
        let space = sample_space();
        let mut session = session(&space);
        let mut runner = FnRunner::new(time_of);
        let mut evaluator = CostEvaluator::new(&space, &mut runner, &mut session);

        let score = evaluator
            .evaluate(Candidate::Config(&config(128, 16)), true)
            .unwrap();
        assert_eq!(score, SENTINEL_SCORE);
        assert_eq!(evaluator.fevals(), 0);
        assert_eq!(session.counters.illegal_rejections, 1);
        assert_eq!(runner.calls(), 0);
    }

    #[test]
    fn repeated_candidates_are_served_from_cache() {
        let space = sample_space();
        let mut session = session(&space);
        let mut runner = FnRunner::new(time_of);
        let mut evaluator = CostEvaluator::new(&space, &mut runner, &mut session);

        let c = config(64, 8);
        assert_eq!(evaluator.evaluate(Candidate::Config(&c), true), Ok(8.0));
        assert_eq!(evaluator.evaluate(Candidate::Config(&c), false), Ok(8.0));
        assert_eq!(evaluator.evaluate(Candidate::Point(&[70.0, 7.0]), true), Ok(8.0));
        assert_eq!(evaluator.fevals(), 1);
        assert_eq!(runner.calls(), 1);
        assert_eq!(session.counters.cache_hits, 2);
        assert_eq!(session.results().len(), 1);
    }

    #[test]
    fn failures_return_sentinel_and_count_as_fevals() {
        let space = sample_space();
        let mut session = session(&space);
        let mut runner = FnRunner::new(time_of);
        let mut evaluator = CostEvaluator::new(&space, &mut runner, &mut session);

        let c = config(32, 16);
        assert_eq!(evaluator.evaluate(Candidate::Config(&c), true), Ok(SENTINEL_SCORE));
        assert_eq!(evaluator.evaluate(Candidate::Config(&c), true), Ok(SENTINEL_SCORE));
        assert_eq!(evaluator.fevals(), 1);
        assert_eq!(runner.calls(), 1);
        assert!(session.results().is_empty());
        assert_eq!(session.counters.failures, 1);
        assert_eq!(session.counters.cache_hits, 1);
    }

    #[test]
    fn scaled_points_are_unscaled_before_snapping() {
        let space = sample_space();
        let mut session = session(&space).with_scaling(true);
        let mut runner = FnRunner::new(time_of);
        let evaluator = CostEvaluator::new(&space, &mut runner, &mut session);
        assert_eq!(evaluator.resolve(Candidate::Point(&[0.0, 0.0])), config(32, 4));
        assert_eq!(evaluator.resolve(Candidate::Point(&[1.0, 0.1])), config(128, 4));
    }

    struct StoppingRunner {
        deliver: bool,
    }

    impl Runner for StoppingRunner {
        fn run(
            &mut self,
            configs: &[Configuration],
            _kernel: &KernelContext,
            _tuning: &TuningContext,
        ) -> RunReport {
            let measurements = if self.deliver {
                vec![Measurement::new(configs[0].clone(), 1.5)]
            } else {
                Vec::new()
            };
            RunReport::stopped(measurements, StopReason::External("halt".into()))
        }

        fn environment(&self) -> Environment {
            Environment::new("test")
        }
    }

    #[test]
    fn stop_signal_propagates_after_recording() {
        let space = sample_space();
        let mut session = session(&space);
        let mut runner = StoppingRunner { deliver: true };
        let mut evaluator = CostEvaluator::new(&space, &mut runner, &mut session);

        let result = evaluator.evaluate(Candidate::Config(&config(32, 4)), true);
        assert_eq!(result, Err(StopReason::External("halt".into())));
        assert_eq!(session.fevals(), 1);
        assert_eq!(session.results()[0].time, Some(1.5));
    }

    #[test]
    fn stop_without_measurements_records_nothing() {
        let space = sample_space();
        let mut session = session(&space);
        let mut runner = StoppingRunner { deliver: false };
        let mut evaluator = CostEvaluator::new(&space, &mut runner, &mut session);

        assert!(evaluator
            .evaluate(Candidate::Config(&config(32, 4)), true)
            .is_err());
        assert_eq!(session.fevals(), 0);
        assert_eq!(session.counters.failures, 0);
    }
}
