//! Uniform sampling of distinct configurations.

use tracing::info;

use kt_types::{KtResult, OptionError};

use crate::cost::{Candidate, CostEvaluator};
use crate::options::{OptionDefault, OptionSpec, TuningOptions};
use crate::runner::Runner;
use crate::session::TuningSession;
use crate::space::SearchSpace;

use super::{budget_termination, Strategy, StrategyOutcome, Termination};

pub const RANDOM_SAMPLE_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new(
        "fraction",
        "Fraction of the search space to evaluate",
        OptionDefault::Float(0.1),
    ),
    OptionSpec::new(
        "max_fevals",
        "Number of configurations to evaluate, overrides fraction",
        OptionDefault::Derived("fraction x size of the search space"),
    ),
];

/// Evaluates a uniform sample of distinct legal configurations.
pub struct RandomSample;

impl RandomSample {
    fn sample_size(options: &TuningOptions, space_size: usize) -> Result<usize, OptionError> {
        let strategy_options = &options.strategy_options;
        let fraction = strategy_options.f64_or("fraction", 0.1)?;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(OptionError::InvalidValue {
                option: "fraction".to_string(),
                value: fraction.to_string(),
                message: "must lie in [0, 1]".to_string(),
            });
        }
        let from_fraction = (fraction * space_size as f64).ceil() as usize;
        let requested = strategy_options.usize_opt("max_fevals")?.unwrap_or(from_fraction);
        Ok(requested.clamp(1, space_size))
    }
}

impl Strategy for RandomSample {
    fn name(&self) -> &'static str {
        "random_sample"
    }

    fn option_specs(&self) -> &'static [OptionSpec] {
        RANDOM_SAMPLE_OPTIONS
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
            .warn_unknown(self.name(), RANDOM_SAMPLE_OPTIONS);
        let samples = Self::sample_size(options, space.size())?;

        let mut rng = options.rng();
        let sample = space.random_sample(samples, &mut rng);
        let mut evaluator = CostEvaluator::new(space, runner, session);
        info!("Random sample of {} out of {} configurations", samples, space.size());

        for config in &sample {
            if let Err(reason) = evaluator.evaluate(Candidate::Config(config), false) {
                return Ok(StrategyOutcome::finish(&evaluator, Termination::Stopped(reason)));
            }
        }
        Ok(StrategyOutcome::finish(&evaluator, budget_termination(&evaluator)))
    }
}
