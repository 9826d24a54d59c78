// This file has code from https://github.com/LIHPC-Computational-Geometry/coupe
pub mod algorithms;
pub mod balance;
pub mod boundary;
pub mod config;
pub mod gen_weights;
pub mod graph;

use rustc_hash::FxHashMap;

use crate::algorithms::Error;
use crate::boundary::PartitionBoundary;
use crate::config::PartitionConfig;
use crate::graph::Graph;

// The `KWayRefinement` trait is the capability set a k-way refinement
// engine offers to the surrounding multilevel pipeline. Engines improve a
// given partition in place and report the achieved edge-cut reduction; they
// never make the cut worse. The parallel multi-try FM engine in
// `algorithms` implements it; a sequential engine would be a second,
// independent implementation selected by the caller.
pub trait KWayRefinement {
    // Refine starting from all boundary vertices, for up to `rounds`
    // rounds. `alpha` parameterizes the adaptive stopping rule of the FM
    // chains; with `init_neighbors` the unclaimed boundary neighbors of
    // each seed join its start set. Returns the total realized gain, a
    // non-negative number; zero means no further improvement is possible
    // under this configuration.
    fn perform_refinement(
        &mut self,
        config: &PartitionConfig,
        graph: &Graph,
        weights: &[i64],
        partition: &mut [usize],
        boundary: &mut PartitionBoundary,
        rounds: u32,
        init_neighbors: bool,
        alpha: u32,
    ) -> Result<i64, Error>;

    // Refine starting only from the boundary between blocks `lhs` and
    // `rhs`, for up to `config.local_multitry_rounds` rounds. Blocks whose
    // contents changed are recorded in `touched_blocks` so the caller can
    // prune its own recomputation.
    fn perform_refinement_around_parts(
        &mut self,
        config: &PartitionConfig,
        graph: &Graph,
        weights: &[i64],
        partition: &mut [usize],
        boundary: &mut PartitionBoundary,
        init_neighbors: bool,
        alpha: u32,
        lhs: usize,
        rhs: usize,
        touched_blocks: &mut FxHashMap<usize, usize>,
    ) -> Result<i64, Error>;
}
