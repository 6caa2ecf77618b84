//! Resampled copies of an observation set.
//!
//! Every draw takes an explicit RNG; callers derive one RNG per iteration with
//! [`iteration_rng`] so results do not depend on execution order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::domain::ObservationSet;

/// Counter-based iteration RNG. Same `(seed, iteration)` gives the same draws.
#[inline]
pub fn iteration_rng(seed: u64, iteration: u64) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_mul(2654435761).wrapping_add(iteration))
}

/// Label permutation: shuffle residuals across objects, keep positions and weights.
pub fn permute_residuals(observations: &ObservationSet, rng: &mut StdRng) -> ObservationSet {
    let mut residuals = observations.residuals();
    residuals.shuffle(rng);
    observations.with_residuals(&residuals)
}

/// Case resampling: draw `n` full tuples with replacement.
pub fn bootstrap_sample(observations: &ObservationSet, rng: &mut StdRng) -> ObservationSet {
    let n = observations.len();
    if n == 0 {
        return observations.clone();
    }
    let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
    observations.select(&indices)
}
