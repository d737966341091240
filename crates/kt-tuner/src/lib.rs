//! # kt-tuner
//!
//! Autotuning search engine for discrete kernel configuration spaces.
//!
//! Provides search space construction from parameter domains and restriction
//! expressions, a cost evaluator that deduplicates and validates candidates
//! before they reach an execution backend, and search strategies (differential
//! evolution, greedy iterative local search, brute force, random sampling).

mod cost;
mod options;
mod restriction;
mod runner;
mod session;
mod space;
mod strategies;

use tracing::{error, info};

use kt_types::KtResult;

pub use cost::{Candidate, CostEvaluator, SENTINEL_SCORE};
pub use options::{describe_options, OptionDefault, OptionSpec, StrategyOptions, TuningOptions};
pub use restriction::{check_restrictions, compile_all, Restriction, Value as RestrictionValue};
pub use runner::{
    BudgetedRunner, FnRunner, KernelContext, RunReport, Runner, StopReason, TuningContext,
};
pub use session::{
    ResultCache, SessionCounters, SessionId, SessionState, TuningReport, TuningSession,
};
pub use space::{NeighborMethod, ParameterDomain, SearchSpace, SpaceLimits};
pub use strategies::{
    hillclimb, mutate, perm_size, random_walk, strategy_for, BruteForce, DeMethod, DiffEvo,
    DiffEvoSettings, GreedyIls, GreedyIlsSettings, InitMethod, RandomSample, Strategy,
    StrategyKind, StrategyOutcome, Termination, BRUTE_FORCE_OPTIONS, DIFF_EVO_OPTIONS,
    GREEDY_ILS_OPTIONS, RANDOM_SAMPLE_OPTIONS,
};

/// Run one tuning session end to end.
///
/// Builds the search space (failing fast on malformed domains or
/// restrictions), runs the configured strategy against `runner` and returns
/// everything it measured. A stop signal from the runner is a normal return
/// with [`SessionState::Stopped`].
pub fn tune(
    runner: &mut dyn Runner,
    kernel: KernelContext,
    options: &TuningOptions,
) -> KtResult<TuningReport> {
    let space = SearchSpace::with_limits(
        options.tune_params.clone(),
        &options.restrictions,
        options.limits,
    )?;

    let mut session = TuningSession::new(space.names().to_vec(), kernel)
        .with_verbose(options.verbose)
        .with_scaling(options.scaling);
    let strategy = strategy_for(options.strategy);

    info!(
        "Tuning session {} with {} over {} configurations",
        session.id,
        strategy.name(),
        space.size()
    );
    session.mark_running();

    let outcome = match strategy.run(runner, &space, options, &mut session) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Tuning session {} failed: {}", session.id, e);
            session.mark_failed(e.to_string());
            return Err(e);
        }
    };

    match &outcome.termination {
        Termination::Stopped(reason) => session.mark_stopped(reason.clone()),
        _ => session.mark_completed(),
    }
    info!(
        "Tuning session {} finished ({}): {} unique evaluations, best {}",
        session.id,
        outcome.termination,
        session.fevals(),
        outcome
            .best
            .as_ref()
            .map_or_else(|| "none".to_string(), |b| b.configuration.to_string())
    );

    Ok(TuningReport::new(&session, options.strategy, outcome))
}
