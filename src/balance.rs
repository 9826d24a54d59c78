// This file has code from https://github.com/LIHPC-Computational-Geometry/coupe
use num_traits::FromPrimitive;
use num_traits::ToPrimitive;
use num_traits::Zero;
use std::iter::Sum;
use std::ops::AddAssign;
use std::ops::Div;
use std::ops::Sub;

// Calculates the total weight for each block of a given partition.
pub fn compute_block_loads<W>(partition: &[usize], num_blocks: usize, weights: W) -> Vec<W::Item>
where
    W: IntoIterator,
    W::Item: Zero + Clone + AddAssign,
{
    let mut loads = vec![W::Item::zero(); num_blocks];

    for (&block, w) in partition.iter().zip(weights.into_iter()) {
        if block < num_blocks {
            loads[block] += w;
        }
    }

    loads
}

/// Compute the imbalance of the given partition.
pub fn imbalance<W>(num_blocks: usize, partition: &[usize], weights: W) -> f64
where
    W: IntoIterator,
    W::Item: Clone + PartialOrd + PartialEq,
    W::Item: Zero + FromPrimitive + ToPrimitive,
    W::Item: AddAssign + Div<Output = W::Item> + Sub<Output = W::Item> + Sum,
{
    if num_blocks == 0 {
        return 0.0;
    }

    let block_loads = compute_block_loads(partition, num_blocks, weights);

    let total_weight: W::Item = block_loads.iter().cloned().sum();

    let ideal_block_weight =
        total_weight.to_f64().unwrap_or(0.0) / num_blocks.to_f64().unwrap_or(1.0);
    if ideal_block_weight == 0.0 {
        return 0.0;
    }

    let max_deviation = block_loads
        .into_iter()
        .map(|block_weight| {
            let block_weight: f64 = block_weight.to_f64().unwrap_or(0.0);
            (block_weight - ideal_block_weight) / ideal_block_weight
        })
        .fold(0.0f64, |acc, dev| acc.max(dev));

    max_deviation
}
