//! Single-parameter mutation.

use rand::seq::SliceRandom;
use rand::Rng;

use kt_types::Configuration;

use crate::session::ResultCache;
use crate::space::SearchSpace;

/// Replace one coordinate of `config` with another value from its domain.
///
/// `index` defaults to a random parameter. With `bias_cache`, values leading
/// to configurations not yet evaluated come first. Legal results are
/// preferred; when no alternative is legal the first alternative is returned.
pub fn mutate<R: Rng + ?Sized>(
    config: &Configuration,
    index: Option<usize>,
    space: &SearchSpace,
    bias_cache: Option<&ResultCache>,
    rng: &mut R,
) -> Configuration {
    let dims = space.dimensions();
    let index = match index {
        Some(i) if i < dims => i,
        _ => rng.random_range(0..dims),
    };
    let (Some(domain), Some(current)) = (space.domain(index), config.get(index)) else {
        return config.clone();
    };

    let mut alternatives: Vec<Configuration> = domain
        .values
        .iter()
        .filter(|value| *value != current)
        .map(|value| config.with_value(index, value.clone()))
        .collect();
    if alternatives.is_empty() {
        return config.clone();
    }

    alternatives.shuffle(rng);
    if let Some(cache) = bias_cache {
        // stable: uncached first, shuffled order kept within each group
        alternatives.sort_by_key(|candidate| cache.contains(candidate));
    }

    let pick = alternatives
        .iter()
        .position(|candidate| space.is_legal(candidate))
        .unwrap_or(0);
    alternatives.swap_remove(pick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::KernelContext;
    use crate::session::TuningSession;
    use crate::space::ParameterDomain;
    use kt_types::{EvaluationResult, Measurement, ParamValue};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn space(restrictions: &[&str]) -> SearchSpace {
        let restrictions: Vec<String> = restrictions.iter().map(|r| r.to_string()).collect();
        SearchSpace::new(
            vec![
                ParameterDomain::new("block_x", [32i64, 64, 128]),
                ParameterDomain::new("block_y", [4i64, 8, 16]),
                ParameterDomain::new("fixed", [1i64]),
            ],
            &restrictions,
        )
        .unwrap()
    }

    fn config(x: i64, y: i64) -> Configuration {
        Configuration::new(vec![ParamValue::Int(x), ParamValue::Int(y), ParamValue::Int(1)])
    }

    #[test]
    fn mutation_changes_every_multi_valued_coordinate() {
        let space = space(&[]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let start = config(64, 8);
        for _ in 0..50 {
            for index in 0..2 {
                let mutated = mutate(&start, Some(index), &space, None, &mut rng);
                assert_ne!(mutated.get(index), start.get(index));
                assert_eq!(mutated.hamming_distance(&start), 1);
            }
        }
    }

    #[test]
    fn single_valued_domain_is_left_alone() {
        let space = space(&[]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let start = config(64, 8);
        assert_eq!(mutate(&start, Some(2), &space, None, &mut rng), start);
    }

    #[test]
    fn legal_alternatives_are_preferred() {
        let space = space(&["block_x * block_y <= 512"]);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..20 {
            let mutated = mutate(&config(32, 16), Some(1), &space, None, &mut rng);
            assert!(space.is_legal(&mutated));
        }
        // no legal alternative for block_x at block_y = 16 besides 32
        let mutated = mutate(&config(32, 16), Some(0), &space, None, &mut rng);
        assert_ne!(mutated, config(32, 16));
        assert!(!space.is_legal(&mutated));
    }

    #[test]
    fn cache_bias_prefers_unevaluated_configurations() {
        let space = space(&[]);
        let names = space.names().to_vec();
        let mut session = TuningSession::new(names.clone(), KernelContext::default());
        session.record(EvaluationResult::measured(
            Measurement::new(config(32, 8), 1.0),
            &names,
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..20 {
            let mutated = mutate(&config(64, 8), Some(0), &space, Some(session.cache()), &mut rng);
            assert_eq!(mutated, config(128, 8));
        }
    }
}
