//! Execution backend contract and runner utilities.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use kt_types::{Configuration, Environment, Measurement};

/// Opaque kernel description handed through to the backend untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KernelContext(pub serde_json::Value);

impl KernelContext {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Session-level settings visible to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningContext {
    pub session_id: Uuid,
    pub parameter_names: Vec<String>,
    pub verbose: bool,
    /// Continuous points live in the unit cube and are unscaled before snapping.
    pub scaling: bool,
}

/// Why a backend asked the search to stop.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    #[error("Evaluation budget of {limit} exhausted")]
    EvaluationBudget { limit: usize },

    #[error("Time limit of {limit_secs:.3}s exceeded")]
    TimeLimit { limit_secs: f64 },

    #[error("Stopped: {0}")]
    External(String),
}

/// What a backend returns for one batch of configurations.
///
/// An empty `measurements` list without a stop signal means the
/// configuration failed to compile or run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub measurements: Vec<Measurement>,
    pub stop: Option<StopReason>,
}

impl RunReport {
    pub fn completed(measurements: Vec<Measurement>) -> Self {
        Self {
            measurements,
            stop: None,
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn stopped(measurements: Vec<Measurement>, reason: StopReason) -> Self {
        Self {
            measurements,
            stop: Some(reason),
        }
    }
}

/// Compiles, runs and times configurations on some device.
pub trait Runner {
    fn run(
        &mut self,
        configs: &[Configuration],
        kernel: &KernelContext,
        tuning: &TuningContext,
    ) -> RunReport;

    /// Snapshot of the device and software the measurements came from.
    fn environment(&self) -> Environment;
}

impl<R: Runner + ?Sized> Runner for Box<R> {
    fn run(
        &mut self,
        configs: &[Configuration],
        kernel: &KernelContext,
        tuning: &TuningContext,
    ) -> RunReport {
        (**self).run(configs, kernel, tuning)
    }

    fn environment(&self) -> Environment {
        (**self).environment()
    }
}

/// Runner backed by a plain objective function; `None` marks a failure.
pub struct FnRunner<F> {
    objective: F,
    environment: Environment,
    calls: usize,
}

impl<F> FnRunner<F>
where
    F: FnMut(&Configuration) -> Option<f64>,
{
    pub fn new(objective: F) -> Self {
        Self {
            objective,
            environment: Environment::new("simulated"),
            calls: 0,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Number of configurations executed so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl<F> Runner for FnRunner<F>
where
    F: FnMut(&Configuration) -> Option<f64>,
{
    fn run(
        &mut self,
        configs: &[Configuration],
        _kernel: &KernelContext,
        _tuning: &TuningContext,
    ) -> RunReport {
        let mut measurements = Vec::with_capacity(configs.len());
        for config in configs {
            self.calls += 1;
            match (self.objective)(config) {
                Some(time) => measurements.push(Measurement::new(config.clone(), time)),
                None => debug!("Objective reported failure for {}", config),
            }
        }
        RunReport::completed(measurements)
    }

    fn environment(&self) -> Environment {
        self.environment.clone()
    }
}

/// Wraps a runner and raises a stop signal once a global evaluation budget
/// or wall-clock limit is used up.
pub struct BudgetedRunner<R> {
    inner: R,
    max_evaluations: Option<usize>,
    time_limit: Option<Duration>,
    started: Option<Instant>,
    evaluations: usize,
}

impl<R: Runner> BudgetedRunner<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_evaluations: None,
            time_limit: None,
            started: None,
            evaluations: 0,
        }
    }

    pub fn with_max_evaluations(mut self, limit: usize) -> Self {
        self.max_evaluations = Some(limit);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn exhausted(&self, started: Instant) -> Option<StopReason> {
        if let Some(limit) = self.max_evaluations {
            if self.evaluations >= limit {
                return Some(StopReason::EvaluationBudget { limit });
            }
        }
        if let Some(limit) = self.time_limit {
            if started.elapsed() >= limit {
                return Some(StopReason::TimeLimit {
                    limit_secs: limit.as_secs_f64(),
                });
            }
        }
        None
    }
}

impl<R: Runner> Runner for BudgetedRunner<R> {
    fn run(
        &mut self,
        configs: &[Configuration],
        kernel: &KernelContext,
        tuning: &TuningContext,
    ) -> RunReport {
        let started = *self.started.get_or_insert_with(Instant::now);
        if let Some(reason) = self.exhausted(started) {
            warn!("{}", reason);
            return RunReport::stopped(Vec::new(), reason);
        }
        self.evaluations += configs.len();
        self.inner.run(configs, kernel, tuning)
    }

    fn environment(&self) -> Environment {
        self.inner.environment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_types::ParamValue;

    fn tuning() -> TuningContext {
        TuningContext {
            session_id: Uuid::new_v4(),
            parameter_names: vec!["block_x".to_string()],
            verbose: false,
            scaling: false,
        }
    }

    fn config(x: i64) -> Configuration {
        Configuration::new(vec![ParamValue::Int(x)])
    }

    fn objective(c: &Configuration) -> Option<f64> {
        match c.values()[0] {
            ParamValue::Int(x) if x > 0 => Some(1000.0 / x as f64),
            _ => None,
        }
    }

    #[test]
    fn fn_runner_measures_and_counts() {
        let mut runner = FnRunner::new(objective);
        let report = runner.run(&[config(10), config(0)], &KernelContext::default(), &tuning());
        assert_eq!(runner.calls(), 2);
        assert_eq!(report.measurements.len(), 1);
        assert_eq!(report.measurements[0].time, 100.0);
        assert!(report.stop.is_none());
        assert_eq!(runner.environment().device_name, "simulated");
    }

    #[test]
    fn budgeted_runner_stops_after_limit() {
        let mut runner = BudgetedRunner::new(FnRunner::new(objective)).with_max_evaluations(2);
        let kernel = KernelContext::default();
        let tuning = tuning();

        assert!(runner.run(&[config(1)], &kernel, &tuning).stop.is_none());
        assert!(runner.run(&[config(2)], &kernel, &tuning).stop.is_none());
        let report = runner.run(&[config(3)], &kernel, &tuning);
        assert_eq!(report.stop, Some(StopReason::EvaluationBudget { limit: 2 }));
        assert!(report.measurements.is_empty());
        assert_eq!(runner.inner().calls(), 2);
    }

    #[test]
    fn budgeted_runner_enforces_time_limit() {
        let mut runner =
            BudgetedRunner::new(FnRunner::new(objective)).with_time_limit(Duration::ZERO);
        let report = runner.run(&[config(1)], &KernelContext::default(), &tuning());
        assert!(matches!(report.stop, Some(StopReason::TimeLimit { .. })));
        assert_eq!(runner.evaluations(), 0);
    }

    #[test]
    fn stop_reason_display() {
        assert_eq!(
            StopReason::EvaluationBudget { limit: 5 }.to_string(),
            "Evaluation budget of 5 exhausted"
        );
        assert_eq!(
            StopReason::External("user interrupt".into()).to_string(),
            "Stopped: user interrupt"
        );
    }
}
