//! Exhaustive sweep in enumeration order.

use tracing::info;

use kt_types::KtResult;

use crate::cost::{Candidate, CostEvaluator};
use crate::options::{OptionDefault, OptionSpec, TuningOptions};
use crate::runner::Runner;
use crate::session::TuningSession;
use crate::space::SearchSpace;

use super::{budget_termination, Strategy, StrategyOutcome, Termination};

pub const BRUTE_FORCE_OPTIONS: &[OptionSpec] = &[OptionSpec::new(
    "max_fevals",
    "Maximum number of configurations evaluated, in enumeration order",
    OptionDefault::Derived("size of the search space"),
)];

/// Exhaustive search over every legal configuration.
pub struct BruteForce;

impl Strategy for BruteForce {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn option_specs(&self) -> &'static [OptionSpec] {
        BRUTE_FORCE_OPTIONS
    }

    fn run(
        &self,
        runner: &mut dyn Runner,
        space: &SearchSpace,
        options: &TuningOptions,
        session: &mut TuningSession,
    ) -> KtResult<StrategyOutcome> {
        options
            .strategy_options
            .warn_unknown(self.name(), BRUTE_FORCE_OPTIONS);
        let max_fevals = options
            .strategy_options
            .usize_opt("max_fevals")?
            .unwrap_or(space.size())
            .min(space.size());

        let mut evaluator = CostEvaluator::new(space, runner, session);
        info!("Brute force over {} of {} configurations", max_fevals, space.size());

        for config in space.iter() {
            if evaluator.fevals() >= max_fevals {
                break;
            }
            if let Err(reason) = evaluator.evaluate(Candidate::Config(&config), false) {
                return Ok(StrategyOutcome::finish(&evaluator, Termination::Stopped(reason)));
            }
        }
        Ok(StrategyOutcome::finish(&evaluator, budget_termination(&evaluator)))
    }
}
