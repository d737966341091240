//! Greedy coordinate hill climb over one configuration's neighbors.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::trace;

use kt_types::Configuration;

use crate::cost::{Candidate, CostEvaluator};
use crate::runner::StopReason;
use crate::space::NeighborMethod;

/// Greedy hill climb from `start` over single-parameter neighbors.
///
/// Parameters and neighbor values are visited in random order. With
/// `first_improvement` the scan restarts from the new position as soon as an
/// improvement is found; otherwise the scan continues from the improved
/// position until a full pass finds nothing better. Returns the local optimum,
/// or the best position when `max_fevals` unique evaluations are reached.
pub fn hillclimb<R: Rng + ?Sized>(
    start: Configuration,
    neighbor: NeighborMethod,
    first_improvement: bool,
    max_fevals: usize,
    evaluator: &mut CostEvaluator<'_>,
    rng: &mut R,
) -> Result<Configuration, StopReason> {
    let mut best = start;
    let mut best_score = evaluator.evaluate(Candidate::Config(&best), false)?;
    let dims = evaluator.space().dimensions();

    let mut improved = true;
    while improved {
        improved = false;
        let mut indices: Vec<usize> = (0..dims).collect();
        indices.shuffle(rng);

        for index in indices {
            let mut neighbors = evaluator.space().param_neighbors(&best, index, neighbor);
            neighbors.shuffle(rng);

            for child in neighbors {
                if evaluator.fevals() >= max_fevals {
                    return Ok(best);
                }
                let score = evaluator.evaluate(Candidate::Config(&child), false)?;
                if score < best_score {
                    trace!("Hill climb improved {} -> {} ({})", best, child, score);
                    best_score = score;
                    best = child;
                    improved = true;
                    if first_improvement {
                        break;
                    }
                }
            }
            if improved && first_improvement {
                break;
            }
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::KernelContext;
    use crate::session::TuningSession;
    use crate::strategies::test_support::{bowl_runner, sample_space};
    use kt_types::ParamValue;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn config(x: i64, y: i64, u: i64) -> Configuration {
        Configuration::new(vec![ParamValue::Int(x), ParamValue::Int(y), ParamValue::Int(u)])
    }

    #[test]
    fn climbs_to_the_bowl_minimum() {
        for first_improvement in [true, false] {
            let space = sample_space();
            let mut session = TuningSession::new(space.names().to_vec(), KernelContext::default());
            let mut runner = bowl_runner();
            let mut evaluator = CostEvaluator::new(&space, &mut runner, &mut session);
            let mut rng = ChaCha8Rng::seed_from_u64(1);

            let optimum = hillclimb(
                config(16, 1, 1),
                NeighborMethod::Hamming,
                first_improvement,
                usize::MAX,
                &mut evaluator,
                &mut rng,
            )
            .unwrap();
            assert_eq!(optimum, config(64, 4, 2));
        }
    }

    #[test]
    fn adjacent_climb_stays_legal() {
        let space = sample_space();
        let mut session = TuningSession::new(space.names().to_vec(), KernelContext::default());
        let mut runner = bowl_runner();
        let mut evaluator = CostEvaluator::new(&space, &mut runner, &mut session);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let optimum = hillclimb(
            config(256, 1, 1),
            NeighborMethod::Adjacent,
            true,
            usize::MAX,
            &mut evaluator,
            &mut rng,
        )
        .unwrap();
        assert!(space.is_legal(&optimum));
        assert_eq!(optimum, config(64, 4, 2));
    }

    #[test]
    fn climb_respects_budget() {
        let space = sample_space();
        let mut session = TuningSession::new(space.names().to_vec(), KernelContext::default());
        let mut runner = bowl_runner();
        let mut evaluator = CostEvaluator::new(&space, &mut runner, &mut session);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        hillclimb(
            config(16, 1, 1),
            NeighborMethod::Hamming,
            false,
            3,
            &mut evaluator,
            &mut rng,
        )
        .unwrap();
        assert_eq!(evaluator.fevals(), 3);
    }
}
