//! Search strategies over a [`SearchSpace`].

mod brute_force;
mod diff_evo;
mod greedy_ils;
mod hillclimb;
mod mutation;
mod random_sample;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use kt_types::{Environment, EvaluationResult, KtResult, OptionError};

use crate::cost::CostEvaluator;
use crate::options::{OptionSpec, TuningOptions};
use crate::runner::{Runner, StopReason};
use crate::session::TuningSession;
use crate::space::SearchSpace;

pub use brute_force::{BruteForce, BRUTE_FORCE_OPTIONS};
pub use diff_evo::{DeMethod, DiffEvo, DiffEvoSettings, InitMethod, DIFF_EVO_OPTIONS};
pub use greedy_ils::{perm_size, random_walk, GreedyIls, GreedyIlsSettings, GREEDY_ILS_OPTIONS};
pub use hillclimb::hillclimb;
pub use mutation::mutate;
pub use random_sample::{RandomSample, RANDOM_SAMPLE_OPTIONS};

/// Why a strategy returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    /// The unique-evaluation budget was used up.
    BudgetExhausted,
    /// Every legal configuration has been evaluated.
    SpaceCovered,
    /// The runner raised a stop signal.
    Stopped(StopReason),
    /// The strategy ran its schedule to the end.
    Completed,
    /// No new configurations were found for too long.
    Stalled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExhausted => f.write_str("evaluation budget exhausted"),
            Self::SpaceCovered => f.write_str("search space covered"),
            Self::Stopped(reason) => write!(f, "{reason}"),
            Self::Completed => f.write_str("completed"),
            Self::Stalled => f.write_str("stalled"),
        }
    }
}

/// What a strategy hands back, partial results included.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub results: Vec<EvaluationResult>,
    pub environment: Environment,
    pub termination: Termination,
    pub best: Option<EvaluationResult>,
}

impl StrategyOutcome {
    pub(crate) fn finish(evaluator: &CostEvaluator<'_>, termination: Termination) -> Self {
        let session = evaluator.session();
        Self {
            results: session.results().to_vec(),
            environment: evaluator.environment(),
            termination,
            best: session.best().cloned(),
        }
    }
}

/// A search procedure driving a [`CostEvaluator`] until it terminates.
pub trait Strategy {
    fn name(&self) -> &'static str;

    fn option_specs(&self) -> &'static [OptionSpec];

    fn run(
        &self,
        runner: &mut dyn Runner,
        space: &SearchSpace,
        options: &TuningOptions,
        session: &mut TuningSession,
    ) -> KtResult<StrategyOutcome>;
}

/// Closed set of available strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    DiffEvo,
    GreedyIls,
    BruteForce,
    RandomSample,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::DiffEvo,
        StrategyKind::GreedyIls,
        StrategyKind::BruteForce,
        StrategyKind::RandomSample,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiffEvo => "diff_evo",
            Self::GreedyIls => "greedy_ils",
            Self::BruteForce => "brute_force",
            Self::RandomSample => "random_sample",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| OptionError::UnknownStrategy {
                name: s.to_string(),
            })
    }
}

/// Instantiate the strategy for `kind`.
pub fn strategy_for(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::DiffEvo => Box::new(DiffEvo),
        StrategyKind::GreedyIls => Box::new(GreedyIls),
        StrategyKind::BruteForce => Box::new(BruteForce),
        StrategyKind::RandomSample => Box::new(RandomSample),
    }
}

/// Termination for a strategy that ended because its budget ran out.
pub(crate) fn budget_termination(evaluator: &CostEvaluator<'_>) -> Termination {
    if evaluator.space_covered() {
        Termination::SpaceCovered
    } else {
        Termination::BudgetExhausted
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use kt_types::{Configuration, KtResult};

    use crate::runner::{FnRunner, KernelContext, Runner};
    use crate::session::TuningSession;
    use crate::space::{ParameterDomain, SearchSpace};

    use super::{Strategy, StrategyOutcome};
    use crate::options::TuningOptions;

    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Three tunable parameters with a product restriction, 28 legal configurations.
    pub fn sample_space() -> SearchSpace {
        SearchSpace::new(
            vec![
                ParameterDomain::new("block_x", [16i64, 32, 64, 128, 256]),
                ParameterDomain::new("block_y", [1i64, 2, 4, 8]),
                ParameterDomain::new("unroll", [1i64, 2]),
            ],
            &["block_x * block_y <= 256".to_string()],
        )
        .expect("sample space is valid")
    }

    /// Smooth bowl with its minimum at (64, 4, 2).
    pub fn bowl(c: &Configuration) -> Option<f64> {
        let x = c.values()[0].as_f64()?;
        let y = c.values()[1].as_f64()?;
        let u = c.values()[2].as_f64()?;
        Some((x.log2() - 6.0).powi(2) + (y.log2() - 2.0).powi(2) + (u - 2.0).abs() + 1.0)
    }

    pub fn run_strategy(
        strategy: &dyn Strategy,
        space: &SearchSpace,
        options: &TuningOptions,
        runner: &mut dyn Runner,
    ) -> (KtResult<StrategyOutcome>, TuningSession) {
        let mut session = TuningSession::new(space.names().to_vec(), KernelContext::default())
            .with_scaling(options.scaling);
        let outcome = strategy.run(runner, space, options, &mut session);
        (outcome, session)
    }

    pub fn bowl_runner() -> FnRunner<fn(&Configuration) -> Option<f64>> {
        FnRunner::new(bowl as fn(&Configuration) -> Option<f64>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_parses_and_displays() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.to_string().parse::<StrategyKind>().unwrap(), kind);
            assert_eq!(strategy_for(kind).name(), kind.as_str());
        }
        assert_eq!("Greedy_ILS".parse::<StrategyKind>().unwrap(), StrategyKind::GreedyIls);
        assert_eq!(
            "genetic_algorithm".parse::<StrategyKind>(),
            Err(OptionError::UnknownStrategy {
                name: "genetic_algorithm".into()
            })
        );
    }

    #[test]
    fn strategy_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StrategyKind::GreedyIls).unwrap(),
            "\"greedy_ils\""
        );
    }

    #[test]
    fn every_strategy_declares_max_fevals() {
        for kind in StrategyKind::ALL {
            let strategy = strategy_for(kind);
            assert!(strategy.option_specs().iter().any(|s| s.name == "max_fevals"));
        }
    }
}
