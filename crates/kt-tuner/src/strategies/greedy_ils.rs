//! Greedy iterative local search: hill climbs interleaved with random-walk
//! perturbations and full restarts after prolonged stagnation.

use rand::Rng;
use tracing::{debug, info};

use kt_types::{Configuration, KtResult, OptionError};

use crate::cost::{Candidate, CostEvaluator};
use crate::options::{OptionDefault, OptionSpec, StrategyOptions, TuningOptions};
use crate::runner::Runner;
use crate::session::TuningSession;
use crate::space::{NeighborMethod, SearchSpace};

use super::{budget_termination, hillclimb, mutate, Strategy, StrategyOutcome, Termination};

pub const GREEDY_ILS_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new(
        "neighbor",
        "Method for selecting neighboring configurations, Hamming or Adjacent",
        OptionDefault::Text("Hamming"),
    ),
    OptionSpec::new(
        "restart",
        "Move on as soon as an improvement is found (true) or scan all neighbors first (false)",
        OptionDefault::Bool(true),
    ),
    OptionSpec::new(
        "no_improvement",
        "Non-improving iterations before restarting from a random configuration",
        OptionDefault::Int(50),
    ),
    OptionSpec::new(
        "random_walk",
        "Fraction of the parameters perturbed between hill climbs",
        OptionDefault::Float(0.3),
    ),
    OptionSpec::new(
        "max_fevals",
        "Maximum number of unique configurations evaluated",
        OptionDefault::Int(100),
    ),
];

/// Parsed options for [`GreedyIls`].
#[derive(Debug, Clone, PartialEq)]
pub struct GreedyIlsSettings {
    pub neighbor: NeighborMethod,
    pub restart: bool,
    pub no_improvement: usize,
    pub random_walk: f64,
    pub max_fevals: usize,
}

impl GreedyIlsSettings {
    pub fn from_options(options: &StrategyOptions) -> Result<Self, OptionError> {
        let random_walk = options.f64_or("random_walk", 0.3)?;
        if !(0.0..=1.0).contains(&random_walk) {
            return Err(OptionError::InvalidValue {
                option: "random_walk".to_string(),
                value: random_walk.to_string(),
                message: "must lie in [0, 1]".to_string(),
            });
        }
        let max_fevals = options.usize_or("max_fevals", 100)?;
        if max_fevals == 0 {
            return Err(OptionError::InvalidValue {
                option: "max_fevals".to_string(),
                value: max_fevals.to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            neighbor: options.str_or("neighbor", "Hamming")?.parse()?,
            restart: options.bool_or("restart", true)?,
            no_improvement: options.usize_or("no_improvement", 50)?,
            random_walk,
            max_fevals,
        })
    }
}

/// Number of single-parameter mutations applied between hill climbs.
pub fn perm_size(random_walk: f64, dimensions: usize) -> usize {
    ((random_walk * dimensions as f64).round() as usize).max(1)
}

/// Perturb `config` for the next climb, or start over after stagnating.
///
/// Once `last_improvement` reaches `no_improvement` a fresh random sample is
/// returned. Otherwise `perm_size` sequential mutations are applied; a result
/// that ends up illegal is replaced by a fresh sample.
pub fn random_walk<R: Rng + ?Sized>(
    config: &Configuration,
    perm_size: usize,
    no_improvement: usize,
    last_improvement: usize,
    space: &SearchSpace,
    rng: &mut R,
) -> Configuration {
    if last_improvement >= no_improvement {
        return space.sample_one(rng);
    }
    let mut walked = config.clone();
    for _ in 0..perm_size {
        walked = mutate(&walked, None, space, None, rng);
    }
    if space.is_legal(&walked) {
        walked
    } else {
        space.sample_one(rng)
    }
}

/// Greedy iterative local search.
pub struct GreedyIls;

impl Strategy for GreedyIls {
    fn name(&self) -> &'static str {
        "greedy_ils"
    }

    fn option_specs(&self) -> &'static [OptionSpec] {
        GREEDY_ILS_OPTIONS
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
            .warn_unknown(self.name(), GREEDY_ILS_OPTIONS);
        let settings = GreedyIlsSettings::from_options(&options.strategy_options)?;
        let perm_size = perm_size(settings.random_walk, space.dimensions());
        let max_fevals = settings.max_fevals.min(space.size());
        let stall_limit = space.size().saturating_mul(10).max(1000);

        session.set_scaling(false);
        let mut rng = options.rng();
        let mut evaluator = CostEvaluator::new(space, runner, session);

        info!(
            "Greedy ILS: neighbor={}, restart={}, perm_size={}, max_fevals={}",
            settings.neighbor, settings.restart, perm_size, max_fevals
        );

        let mut candidate = space.sample_one(&mut rng);
        let mut best_score = match evaluator.evaluate(Candidate::Config(&candidate), false) {
            Ok(score) => score,
            Err(reason) => return Ok(StrategyOutcome::finish(&evaluator, Termination::Stopped(reason))),
        };

        let mut last_improvement = 0;
        let mut stalled_for = 0;
        let termination = loop {
            if evaluator.fevals() >= max_fevals {
                break budget_termination(&evaluator);
            }
            let fevals_before = evaluator.fevals();

            let climbed = match hillclimb(
                candidate,
                settings.neighbor,
                settings.restart,
                max_fevals,
                &mut evaluator,
                &mut rng,
            ) {
                Ok(climbed) => climbed,
                Err(reason) => break Termination::Stopped(reason),
            };
            let new_score = match evaluator.evaluate(Candidate::Config(&climbed), false) {
                Ok(score) => score,
                Err(reason) => break Termination::Stopped(reason),
            };

            if new_score < best_score {
                debug!("New best {} ({})", climbed, new_score);
                best_score = new_score;
                last_improvement = 0;
            } else {
                last_improvement += 1;
            }

            if last_improvement >= settings.no_improvement {
                debug!(
                    "No improvement for {} iterations, restarting",
                    last_improvement
                );
            }
            candidate = random_walk(
                &climbed,
                perm_size,
                settings.no_improvement,
                last_improvement,
                space,
                &mut rng,
            );

            if evaluator.fevals() > fevals_before {
                stalled_for = 0;
            } else {
                stalled_for += 1;
                if stalled_for >= stall_limit {
                    break Termination::Stalled;
                }
            }
        };

        info!(
            "Greedy ILS finished: {} after {} unique evaluations",
            termination,
            evaluator.fevals()
        );
        Ok(StrategyOutcome::finish(&evaluator, termination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::FnRunner;
    use crate::space::ParameterDomain;
    use crate::strategies::test_support::{bowl_runner, init_tracing, run_strategy, sample_space};
    use kt_types::ParamValue;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn perm_size_scales_with_dimensions() {
        assert_eq!(perm_size(0.3, 10), 3);
        assert_eq!(perm_size(0.3, 2), 1);
        assert_eq!(perm_size(0.0, 5), 1);
        assert_eq!(perm_size(1.0, 4), 4);
    }

    #[test]
    fn settings_defaults_and_overrides() {
        let defaults = GreedyIlsSettings::from_options(&StrategyOptions::new()).unwrap();
        assert_eq!(
            defaults,
            GreedyIlsSettings {
                neighbor: NeighborMethod::Hamming,
                restart: true,
                no_improvement: 50,
                random_walk: 0.3,
                max_fevals: 100,
            }
        );

        let options = StrategyOptions::new()
            .with("neighbor", "adjacent")
            .with("restart", false);
        let settings = GreedyIlsSettings::from_options(&options).unwrap();
        assert_eq!(settings.neighbor, NeighborMethod::Adjacent);
        assert!(!settings.restart);

        let bad = StrategyOptions::new().with("random_walk", 1.5);
        assert!(GreedyIlsSettings::from_options(&bad).is_err());

        let no_budget = StrategyOptions::new().with("max_fevals", 0);
        assert!(matches!(
            GreedyIlsSettings::from_options(&no_budget),
            Err(OptionError::InvalidValue { option, .. }) if option == "max_fevals"
        ));
    }

    #[test]
    fn zero_budget_is_rejected_before_evaluating() {
        let space = sample_space();
        let options = TuningOptions::new().with_option("max_fevals", 0);
        let mut runner = bowl_runner();

        let (outcome, session) = run_strategy(&GreedyIls, &space, &options, &mut runner);
        assert!(outcome.is_err());
        assert_eq!(session.fevals(), 0);
        assert_eq!(runner.calls(), 0);
    }

    #[test]
    fn escape_after_stagnation_is_a_fresh_sample() {
        let space = sample_space();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let start = space.sample_one(&mut rng);
        for last_improvement in [5, 6, 40] {
            for _ in 0..20 {
                let mut sampler = rng.clone();
                let expected = space.sample_one(&mut sampler);
                let escaped = random_walk(&start, 1, 5, last_improvement, &space, &mut rng);
                assert_eq!(escaped, expected);
                assert_eq!(rng, sampler);
            }
        }
    }

    #[test]
    fn walk_perturbs_and_stays_legal() {
        let space = sample_space();
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        for _ in 0..50 {
            let start = space.sample_one(&mut rng);
            let walked = random_walk(&start, 1, 50, 0, &space, &mut rng);
            assert!(space.is_legal(&walked));
        }
    }

    #[test]
    fn respects_the_evaluation_budget() {
        init_tracing();
        let space = sample_space();
        let options = TuningOptions::new()
            .with_seed(21)
            .with_option("max_fevals", 10);
        let mut runner = bowl_runner();

        let (outcome, session) = run_strategy(&GreedyIls, &space, &options, &mut runner);
        let outcome = outcome.unwrap();

        assert_eq!(outcome.termination, Termination::BudgetExhausted);
        assert_eq!(session.fevals(), 10);
        assert_eq!(runner.calls(), 10);
        assert_eq!(outcome.results.len(), 10);
        assert!(!session.context.scaling);
    }

    #[test]
    fn covers_small_spaces_and_finds_the_minimum() {
        let space = sample_space();
        let options = TuningOptions::new()
            .with_seed(5)
            .with_option("max_fevals", 1000)
            .with_option("neighbor", "Adjacent");
        let mut runner = bowl_runner();

        let (outcome, session) = run_strategy(&GreedyIls, &space, &options, &mut runner);
        let outcome = outcome.unwrap();
        assert_eq!(outcome.termination, Termination::SpaceCovered);
        assert_eq!(session.fevals(), space.size());
        assert_eq!(
            outcome.best.unwrap().configuration,
            Configuration::new(vec![ParamValue::Int(64), ParamValue::Int(4), ParamValue::Int(2)])
        );
    }

    #[test]
    fn full_neighbor_scan_finds_the_minimum() {
        let space = sample_space();
        let options = TuningOptions::new()
            .with_seed(9)
            .with_option("max_fevals", 1000)
            .with_option("restart", false);
        let mut runner = bowl_runner();

        let (outcome, session) = run_strategy(&GreedyIls, &space, &options, &mut runner);
        let outcome = outcome.unwrap();
        assert_eq!(outcome.termination, Termination::SpaceCovered);
        assert_eq!(session.fevals(), space.size());
        assert_eq!(
            outcome.best.unwrap().configuration,
            Configuration::new(vec![ParamValue::Int(64), ParamValue::Int(4), ParamValue::Int(2)])
        );
    }

    #[test]
    fn flat_objective_keeps_restarting_until_the_budget() {
        let space = sample_space();
        let options = TuningOptions::new()
            .with_seed(4)
            .with_option("max_fevals", 20)
            .with_option("no_improvement", 1);
        let mut runner = FnRunner::new(|_: &Configuration| Some(1.0));

        let (outcome, session) = run_strategy(&GreedyIls, &space, &options, &mut runner);
        let outcome = outcome.unwrap();
        assert_eq!(outcome.termination, Termination::BudgetExhausted);
        assert_eq!(session.fevals(), 20);
        assert_eq!(runner.calls(), 20);
        assert!(outcome.results.iter().all(|r| space.is_legal(&r.configuration)));
    }

    #[test]
    fn single_configuration_space_terminates() {
        let space = SearchSpace::new(vec![ParameterDomain::new("block_x", [64i64])], &[]).unwrap();
        let options = TuningOptions::new().with_seed(1);
        let mut runner = FnRunner::new(|_: &Configuration| Some(1.0));

        let (outcome, session) = run_strategy(&GreedyIls, &space, &options, &mut runner);
        assert_eq!(outcome.unwrap().termination, Termination::SpaceCovered);
        assert_eq!(session.fevals(), 1);
    }
}
