//! Tuning session state: result cache, visible results and run lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use kt_types::{Configuration, Environment, EvaluationResult};

use crate::runner::{KernelContext, StopReason, TuningContext};
use crate::strategies::{StrategyKind, StrategyOutcome, Termination};

/// Unique tuning session identifier.
pub type SessionId = Uuid;

/// Every configuration evaluated in a session, failures included.
///
/// Its length is the number of unique function evaluations.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: HashMap<Configuration, EvaluationResult>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, config: &Configuration) -> Option<&EvaluationResult> {
        self.entries.get(config)
    }

    pub fn contains(&self, config: &Configuration) -> bool {
        self.entries.contains_key(config)
    }

    /// Insert unless the configuration is already cached. Returns whether it was new.
    pub fn insert(&mut self, result: EvaluationResult) -> bool {
        if self.entries.contains_key(&result.configuration) {
            return false;
        }
        self.entries.insert(result.configuration.clone(), result);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.entries.values()
    }
}

/// Lifecycle state for a tuning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// Bookkeeping counters maintained by the cost evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub runner_calls: usize,
    pub illegal_rejections: usize,
    pub failures: usize,
    pub cache_hits: usize,
}

/// Mutable state of one tuning run, owned by the caller.
#[derive(Debug, Clone)]
pub struct TuningSession {
    pub id: SessionId,
    pub state: SessionState,
    pub context: TuningContext,
    pub kernel: KernelContext,
    cache: ResultCache,
    results: Vec<EvaluationResult>,
    pub counters: SessionCounters,
    best: Option<EvaluationResult>,
    pub stop: Option<StopReason>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TuningSession {
    pub fn new(parameter_names: Vec<String>, kernel: KernelContext) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            state: SessionState::Pending,
            context: TuningContext {
                session_id: id,
                parameter_names,
                verbose: false,
                scaling: false,
            },
            kernel,
            cache: ResultCache::new(),
            results: Vec::new(),
            counters: SessionCounters::default(),
            best: None,
            stop: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    pub fn with_scaling(mut self, scaling: bool) -> Self {
        self.context.scaling = scaling;
        self
    }

    pub fn set_scaling(&mut self, scaling: bool) {
        self.context.scaling = scaling;
    }

    pub fn names(&self) -> &[String] {
        &self.context.parameter_names
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Successful evaluations in the order they were measured.
    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    pub fn best(&self) -> Option<&EvaluationResult> {
        self.best.as_ref()
    }

    /// Number of unique configurations evaluated, failures included.
    pub fn fevals(&self) -> usize {
        self.cache.len()
    }

    pub fn mark_running(&mut self) {
        self.state = SessionState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = SessionState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_stopped(&mut self, reason: StopReason) {
        self.state = SessionState::Stopped;
        self.finished_at = Some(Utc::now());
        self.stop = Some(reason);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = SessionState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Record an evaluation. Duplicates are ignored; failures are cached
    /// but kept out of the visible results.
    pub fn record(&mut self, result: EvaluationResult) -> bool {
        if !self.cache.insert(result.clone()) {
            return false;
        }
        if result.is_failure() {
            self.counters.failures += 1;
        } else {
            self.update_best(&result);
            self.results.push(result);
        }
        true
    }

    /// Update the best result if `result` is faster than the current best.
    fn update_best(&mut self, result: &EvaluationResult) {
        let improves = match (&self.best, result.time) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(current), Some(time)) => current.time.map_or(true, |best| time < best),
        };
        if improves {
            self.best = Some(result.clone());
        }
    }
}

/// Everything a finished tuning run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    pub session_id: SessionId,
    pub strategy: StrategyKind,
    pub state: SessionState,
    pub termination: Termination,
    pub results: Vec<EvaluationResult>,
    pub best: Option<EvaluationResult>,
    pub environment: Environment,
    /// Unique configurations evaluated, failures included.
    pub fevals: usize,
    pub counters: SessionCounters,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TuningReport {
    pub fn new(session: &TuningSession, strategy: StrategyKind, outcome: StrategyOutcome) -> Self {
        Self {
            session_id: session.id,
            strategy,
            state: session.state,
            termination: outcome.termination,
            results: outcome.results,
            best: outcome.best,
            environment: outcome.environment,
            fevals: session.fevals(),
            counters: session.counters,
            started_at: session.started_at,
            finished_at: session.finished_at,
        }
    }

    pub fn best_configuration(&self) -> Option<&Configuration> {
        self.best.as_ref().map(|b| &b.configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_types::{Measurement, ParamValue};

    fn names() -> Vec<String> {
        vec!["block_x".to_string(), "block_y".to_string()]
    }

    fn config(x: i64, y: i64) -> Configuration {
        Configuration::new(vec![ParamValue::Int(x), ParamValue::Int(y)])
    }

    fn measured(x: i64, y: i64, time: f64) -> EvaluationResult {
        EvaluationResult::measured(Measurement::new(config(x, y), time), &names())
    }

    #[test]
    fn session_lifecycle() {
        let mut session = TuningSession::new(names(), KernelContext::default());
        assert_eq!(session.state, SessionState::Pending);
        assert_eq!(session.context.session_id, session.id);

        session.mark_running();
        assert_eq!(session.state, SessionState::Running);
        assert!(session.started_at.is_some());

        session.mark_stopped(StopReason::External("interrupt".into()));
        assert_eq!(session.state, SessionState::Stopped);
        assert!(session.finished_at.is_some());
        assert!(session.stop.is_some());
    }

    #[test]
    fn record_tracks_best_and_ignores_duplicates() {
        let mut session = TuningSession::new(names(), KernelContext::default());
        assert!(session.record(measured(32, 4, 5.0)));
        assert!(session.record(measured(64, 4, 2.0)));
        assert!(session.record(measured(128, 4, 3.0)));
        assert!(!session.record(measured(64, 4, 0.1)));

        assert_eq!(session.fevals(), 3);
        assert_eq!(session.results().len(), 3);
        let best = session.best().unwrap();
        assert_eq!(best.configuration, config(64, 4));
        assert_eq!(best.time, Some(2.0));
    }

    #[test]
    fn failures_are_cached_but_not_visible() {
        let mut session = TuningSession::new(names(), KernelContext::default());
        assert!(session.record(EvaluationResult::failed(config(32, 16), &names())));
        assert_eq!(session.fevals(), 1);
        assert!(session.results().is_empty());
        assert!(session.best().is_none());
        assert_eq!(session.counters.failures, 1);
        assert!(session.cache().get(&config(32, 16)).unwrap().is_failure());
    }
}
