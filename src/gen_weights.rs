use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Generate the weight vector where each vertex has the same weight
pub fn gen_uniform_weights(no_of_vertices: usize) -> Vec<i64> {
    vec![1; no_of_vertices]
}

/// Generate the weight vector where each vertex has a random weight drawn
/// from `[min_weight, max_weight]`, reproducibly for a given seed.
pub fn gen_random_weights(
    no_of_vertices: usize,
    min_weight: i64,
    max_weight: i64,
    seed: u64,
) -> Vec<i64> {
    if max_weight < min_weight {
        panic!("Max weight must be greater than min weight.");
    }

    if min_weight <= 0 {
        panic!("Min weight must be positive.");
    }
    let mut rng = SmallRng::seed_from_u64(seed);

    let random_weights: Vec<i64> = (0..no_of_vertices)
        .map(|_| rng.gen_range(min_weight..=max_weight))
        .collect();

    random_weights
}
