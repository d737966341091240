//! Differential evolution over the continuous relaxation of the space.
//!
//! The population lives in continuous coordinates (the parameter bounds, or
//! the unit cube when scaling is on). Every point is snapped onto the
//! discrete space by the [`CostEvaluator`] before it is scored.

use rand::seq::{index, SliceRandom};
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use kt_types::{KtResult, OptionError};

use crate::cost::{Candidate, CostEvaluator};
use crate::options::{OptionDefault, OptionSpec, StrategyOptions, TuningOptions};
use crate::runner::Runner;
use crate::session::TuningSession;
use crate::space::SearchSpace;

use super::{budget_termination, Strategy, StrategyOutcome, Termination};

pub const DIFF_EVO_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new(
        "popsize",
        "Population size multiplier, members = popsize x parameters (at least 5)",
        OptionDefault::Int(15),
    ),
    OptionSpec::new(
        "maxiter",
        "Number of generations after initialization",
        OptionDefault::Int(1),
    ),
    OptionSpec::new(
        "mutation_min",
        "Lower end of the dithered mutation factor",
        OptionDefault::Float(0.5),
    ),
    OptionSpec::new(
        "mutation_max",
        "Upper end of the dithered mutation factor",
        OptionDefault::Float(1.0),
    ),
    OptionSpec::new(
        "recombination",
        "Crossover probability",
        OptionDefault::Float(0.7),
    ),
    OptionSpec::new(
        "method",
        "Mutation scheme, best1bin or rand1bin",
        OptionDefault::Text("best1bin"),
    ),
    OptionSpec::new(
        "init",
        "Population initialization, latin_hypercube or random",
        OptionDefault::Text("latin_hypercube"),
    ),
    OptionSpec::new(
        "max_fevals",
        "Maximum number of unique configurations evaluated",
        OptionDefault::Derived("size of the search space"),
    ),
];

/// Base vector selection for the mutant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeMethod {
    /// Best member + one scaled difference, binomial crossover.
    #[default]
    Best1Bin,
    /// Random member + one scaled difference, binomial crossover.
    Rand1Bin,
}

impl FromStr for DeMethod {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best1bin" => Ok(Self::Best1Bin),
            "rand1bin" => Ok(Self::Rand1Bin),
            _ => Err(OptionError::InvalidValue {
                option: "method".to_string(),
                value: s.to_string(),
                message: "choose from best1bin or rand1bin".to_string(),
            }),
        }
    }
}

impl fmt::Display for DeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best1Bin => f.write_str("best1bin"),
            Self::Rand1Bin => f.write_str("rand1bin"),
        }
    }
}

/// Initial population layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitMethod {
    /// One member per stratum in every dimension.
    #[default]
    LatinHypercube,
    Random,
}

impl FromStr for InitMethod {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latin_hypercube" | "latinhypercube" => Ok(Self::LatinHypercube),
            "random" => Ok(Self::Random),
            _ => Err(OptionError::InvalidValue {
                option: "init".to_string(),
                value: s.to_string(),
                message: "choose from latin_hypercube or random".to_string(),
            }),
        }
    }
}

/// Parsed options for [`DiffEvo`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEvoSettings {
    pub popsize: usize,
    pub maxiter: usize,
    pub mutation_min: f64,
    pub mutation_max: f64,
    pub recombination: f64,
    pub method: DeMethod,
    pub init: InitMethod,
    /// `None` means the size of the search space.
    pub max_fevals: Option<usize>,
}

impl DiffEvoSettings {
    pub fn from_options(options: &StrategyOptions) -> Result<Self, OptionError> {
        let settings = Self {
            popsize: options.usize_or("popsize", 15)?,
            maxiter: options.usize_or("maxiter", 1)?,
            mutation_min: options.f64_or("mutation_min", 0.5)?,
            mutation_max: options.f64_or("mutation_max", 1.0)?,
            recombination: options.f64_or("recombination", 0.7)?,
            method: options.str_or("method", "best1bin")?.parse()?,
            init: options.str_or("init", "latin_hypercube")?.parse()?,
            max_fevals: options.usize_opt("max_fevals")?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), OptionError> {
        let invalid = |option: &str, value: String, message: &str| OptionError::InvalidValue {
            option: option.to_string(),
            value,
            message: message.to_string(),
        };
        if self.popsize == 0 {
            return Err(invalid("popsize", "0".into(), "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.recombination) {
            return Err(invalid(
                "recombination",
                self.recombination.to_string(),
                "must lie in [0, 1]",
            ));
        }
        let range_ok = 0.0 <= self.mutation_min
            && self.mutation_min <= self.mutation_max
            && self.mutation_max <= 2.0;
        if !range_ok {
            return Err(invalid(
                "mutation_min",
                format!("{}..{}", self.mutation_min, self.mutation_max),
                "need 0 <= mutation_min <= mutation_max <= 2",
            ));
        }
        Ok(())
    }

    /// Mutation factor for one generation, dithered within the range.
    fn sample_factor<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.mutation_min < self.mutation_max {
            rng.random_range(self.mutation_min..self.mutation_max)
        } else {
            self.mutation_min
        }
    }
}

/// Differential evolution with snapping onto the discrete space.
pub struct DiffEvo;

impl Strategy for DiffEvo {
    fn name(&self) -> &'static str {
        "diff_evo"
    }

    fn option_specs(&self) -> &'static [OptionSpec] {
        DIFF_EVO_OPTIONS
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
            .warn_unknown(self.name(), DIFF_EVO_OPTIONS);
        let settings = DiffEvoSettings::from_options(&options.strategy_options)?;

        let dims = space.dimensions();
        let max_fevals = settings.max_fevals.unwrap_or(space.size()).min(space.size());
        let bounds = if session.context.scaling {
            vec![(0.0, 1.0); dims]
        } else {
            space.bounds()
        };
        let members = settings.popsize.saturating_mul(dims).max(5);

        let mut rng = options.rng();
        let mut evaluator = CostEvaluator::new(space, runner, session);

        info!(
            "Differential evolution: {} members, {} generations, {}, max_fevals={}",
            members, settings.maxiter, settings.method, max_fevals
        );

        let mut population = initial_population(members, &bounds, settings.init, &mut rng);
        let mut scores = Vec::with_capacity(members);
        for member in &population {
            if evaluator.fevals() >= max_fevals {
                return Ok(StrategyOutcome::finish(&evaluator, budget_termination(&evaluator)));
            }
            match evaluator.evaluate(Candidate::Point(member), true) {
                Ok(score) => scores.push(score),
                Err(reason) => {
                    return Ok(StrategyOutcome::finish(&evaluator, Termination::Stopped(reason)))
                }
            }
        }

        let mut best = argmin(&scores);
        for generation in 0..settings.maxiter {
            let factor = settings.sample_factor(&mut rng);
            for target in 0..members {
                if evaluator.fevals() >= max_fevals {
                    return Ok(StrategyOutcome::finish(&evaluator, budget_termination(&evaluator)));
                }
                let trial = trial_vector(
                    target,
                    best,
                    &population,
                    factor,
                    &settings,
                    &bounds,
                    &mut rng,
                );
                let score = match evaluator.evaluate(Candidate::Point(&trial), true) {
                    Ok(score) => score,
                    Err(reason) => {
                        return Ok(StrategyOutcome::finish(&evaluator, Termination::Stopped(reason)))
                    }
                };
                if score <= scores[target] {
                    population[target] = trial;
                    scores[target] = score;
                    if score <= scores[best] {
                        best = target;
                    }
                }
            }
            debug!(
                "Generation {}: best score {} after {} unique evaluations",
                generation + 1,
                scores[best],
                evaluator.fevals()
            );
        }

        let best_config = evaluator.resolve(Candidate::Point(&population[best]));
        info!(
            "Differential evolution finished: best {} ({})",
            best_config, scores[best]
        );

        let termination = if evaluator.fevals() >= max_fevals {
            budget_termination(&evaluator)
        } else {
            Termination::Completed
        };
        Ok(StrategyOutcome::finish(&evaluator, termination))
    }
}

fn initial_population<R: Rng + ?Sized>(
    members: usize,
    bounds: &[(f64, f64)],
    init: InitMethod,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    let mut population = vec![vec![0.0; bounds.len()]; members];
    for (j, &(lo, hi)) in bounds.iter().enumerate() {
        match init {
            InitMethod::LatinHypercube => {
                let mut strata: Vec<usize> = (0..members).collect();
                strata.shuffle(rng);
                for (member, stratum) in population.iter_mut().zip(strata) {
                    let u = (stratum as f64 + rng.random::<f64>()) / members as f64;
                    member[j] = lo + u * (hi - lo);
                }
            }
            InitMethod::Random => {
                for member in population.iter_mut() {
                    member[j] = lo + rng.random::<f64>() * (hi - lo);
                }
            }
        }
    }
    population
}

/// Mutant + binomial crossover for `target`.
///
/// Out-of-bounds coordinates are re-drawn uniformly within bounds.
fn trial_vector<R: Rng + ?Sized>(
    target: usize,
    best: usize,
    population: &[Vec<f64>],
    factor: f64,
    settings: &DiffEvoSettings,
    bounds: &[(f64, f64)],
    rng: &mut R,
) -> Vec<f64> {
    let picks: Vec<usize> = index::sample(rng, population.len() - 1, 3)
        .into_iter()
        .map(|i| if i >= target { i + 1 } else { i })
        .collect();
    let (base, r1, r2) = match settings.method {
        DeMethod::Best1Bin => (best, picks[0], picks[1]),
        DeMethod::Rand1Bin => (picks[0], picks[1], picks[2]),
    };

    let forced = rng.random_range(0..bounds.len());
    bounds
        .iter()
        .enumerate()
        .map(|(j, &(lo, hi))| {
            if j != forced && rng.random::<f64>() >= settings.recombination {
                return population[target][j];
            }
            let v = population[base][j] + factor * (population[r1][j] - population[r2][j]);
            if v < lo || v > hi {
                lo + rng.random::<f64>() * (hi - lo)
            } else {
                v
            }
        })
        .collect()
}

fn argmin(scores: &[f64]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(bi, bv), (i, &v)| {
            if v < bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}
