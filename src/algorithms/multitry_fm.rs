// Parallel multi-try k-way FM refinement.
//
// Worker threads speculatively build localized FM chains over a shared
// vertex pool, claiming vertices through per-vertex atomic flags and
// checking balance against tentative per-block atomic weights. After all
// workers have joined, a single-threaded commit phase replays the chains
// against the authoritative partition, keeps each chain's best valid prefix
// and re-queues vertices whose speculative move did not survive.

use crossbeam::queue::SegQueue;
use crossbeam::utils::CachePadded;
use log::debug;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use crate::algorithms::refinement_core::{apply_moves, single_refinement_round, ThreadData};
use crate::algorithms::{Error, RefinementStatistics};
use crate::boundary::PartitionBoundary;
use crate::config::PartitionConfig;
use crate::graph::Graph;
use crate::KWayRefinement;

/// Fraction of the graph's vertices that may be moved speculatively before
/// workers return early. Bounds the divergence between workers and with it
/// the amount of commit-phase rollback.
const MOVED_FRACTION_LIMIT: f64 = 0.05;

/// State shared by all refinement workers during the parallel phase.
///
/// Claim flags and block counters use relaxed atomics: a claim has a single
/// writer after the winning test-and-set, and the block weights are advisory
/// during speculation since the commit phase re-validates every move against
/// ground truth. The worker join is the only cross-thread happens-before
/// edge the engine relies on.
pub(crate) struct SharedRefinementData {
    moved: Vec<AtomicBool>,
    block_weights: Vec<CachePadded<AtomicI64>>,
    block_sizes: Vec<CachePadded<AtomicUsize>>,
    moved_count: Vec<CachePadded<AtomicUsize>>,
    pub queue: SegQueue<usize>,
}

impl SharedRefinementData {
    pub fn new(num_vertices: usize, num_blocks: usize, num_threads: usize) -> Self {
        SharedRefinementData {
            moved: (0..num_vertices).map(|_| AtomicBool::new(false)).collect(),
            block_weights: (0..num_blocks)
                .map(|_| CachePadded::new(AtomicI64::new(0)))
                .collect(),
            block_sizes: (0..num_blocks)
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect(),
            moved_count: (0..num_threads)
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect(),
            queue: SegQueue::new(),
        }
    }

    /// Test-and-set the claim flag of `vertex`, returning the prior value.
    pub fn claim(&self, vertex: usize) -> bool {
        self.moved[vertex].swap(true, Ordering::Relaxed)
    }

    pub fn unclaim(&self, vertex: usize) {
        self.moved[vertex].store(false, Ordering::Relaxed);
    }

    pub fn is_claimed(&self, vertex: usize) -> bool {
        self.moved[vertex].load(Ordering::Relaxed)
    }

    /// The tentative weight of `block`, including uncommitted speculative
    /// moves of all workers.
    pub fn tentative_block_weight(&self, block: usize) -> i64 {
        self.block_weights[block].load(Ordering::Relaxed)
    }

    /// Account a speculative move of a vertex of weight `weight` between
    /// blocks in the tentative counters.
    pub fn move_tentative_weight(&self, from: usize, to: usize, weight: i64) {
        self.block_weights[from].fetch_sub(weight, Ordering::Relaxed);
        self.block_weights[to].fetch_add(weight, Ordering::Relaxed);
        self.block_sizes[from].fetch_sub(1, Ordering::Relaxed);
        self.block_sizes[to].fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_moved(&self, thread_id: usize, count: usize) {
        self.moved_count[thread_id].fetch_add(count, Ordering::Relaxed);
    }

    pub fn total_moved(&self) -> usize {
        self.moved_count
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    /// Reset for a new localized-search call: clears every claim flag and
    /// per-thread move counter, then re-synchronises the block counters.
    pub fn reset_global(&self, boundary: &PartitionBoundary) {
        for flag in &self.moved {
            flag.store(false, Ordering::Relaxed);
        }
        for count in &self.moved_count {
            count.store(0, Ordering::Relaxed);
        }
        self.partial_reset_global(boundary);
    }

    /// Reset between inner phases of one call: claim flags and move counters
    /// stay, the block counters are rebuilt from the authoritative boundary
    /// state and queue leftovers are dropped (a later round re-seeds them).
    pub fn partial_reset_global(&self, boundary: &PartitionBoundary) {
        for (block, weight) in self.block_weights.iter().enumerate() {
            weight.store(boundary.block_weight(block), Ordering::Relaxed);
        }
        for (block, size) in self.block_sizes.iter().enumerate() {
            size.store(boundary.block_size(block), Ordering::Relaxed);
        }
        while self.queue.pop().is_some() {}
    }
}

/// One worker of the parallel phase: pops seeds from the shared pool, grows
/// a start set around each, and runs speculative FM chains until the pool
/// drains or the global moved-fraction rule asks it to back off.
fn worker_task(
    td: &mut ThreadData,
    graph: &Graph,
    weights: &[i64],
    partition: &[usize],
    shared: &SharedRefinementData,
    config: &PartitionConfig,
    init_neighbors: bool,
) {
    td.reset();

    let balance_ok = |block: usize, weight: i64| {
        shared.tentative_block_weight(block) + weight <= config.upper_bound_partition
    };

    while let Some(node) = shared.queue.pop() {
        let from = td.local_block_of(partition, node);
        let (_, _, external_degree) =
            td.compute_gain(graph, weights, partition, balance_ok, node, from);

        if !shared.is_claimed(node) && external_degree > 0 {
            td.start_nodes.clear();
            td.start_nodes.push(node);

            if init_neighbors {
                for (neighbor, _) in graph.neighbors(node) {
                    if shared.is_claimed(neighbor) {
                        continue;
                    }
                    let neighbor_from = td.local_block_of(partition, neighbor);
                    let (_, _, neighbor_external) = td.compute_gain(
                        graph,
                        weights,
                        partition,
                        balance_ok,
                        neighbor,
                        neighbor_from,
                    );
                    if neighbor_external > 0 {
                        td.start_nodes.push(neighbor);
                    }
                }
            }

            let outcome = single_refinement_round(td, graph, weights, partition, shared, config);
            td.stats.upper_bound_gain += outcome.improvement;
            shared.add_moved(td.id, outcome.moved);
        }

        if shared.total_moved() as f64 > MOVED_FRACTION_LIMIT * graph.len() as f64 {
            td.stats.stop_fraction_of_nodes_moved += 1;
            return;
        }
    }
}

/// Parallel multi-try k-way FM refinement engine.
///
/// Owns a fixed-size worker pool and the statistics accumulated across the
/// calls made through it. The engine never worsens the edge cut of the
/// partition it is given.
pub struct MultitryKwayFm {
    pool: rayon::ThreadPool,
    num_threads: usize,
    statistics: RefinementStatistics,
}

impl MultitryKwayFm {
    /// Build an engine with a worker pool sized by `config.num_threads`.
    pub fn new(config: &PartitionConfig) -> Result<Self, Error> {
        let num_threads = config.num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|err| Error::ThreadPoolBuild(err.to_string()))?;

        Ok(MultitryKwayFm {
            pool,
            num_threads,
            statistics: RefinementStatistics::default(),
        })
    }

    /// Statistics accumulated since construction (or the last take).
    pub fn statistics(&self) -> &RefinementStatistics {
        &self.statistics
    }

    /// Hand the accumulated statistics to the caller and start over.
    pub fn take_statistics(&mut self) -> RefinementStatistics {
        std::mem::take(&mut self.statistics)
    }

    /// Total gain realized on authoritative partitions so far.
    pub fn get_performed_gain(&self) -> i64 {
        self.statistics.performed_gain
    }

    pub fn print_full_statistics(&self) {
        println!("{}", self.statistics);
    }

    fn validate(
        &self,
        config: &PartitionConfig,
        graph: &Graph,
        weights: &[i64],
        partition: &[usize],
        boundary: &PartitionBoundary,
    ) -> Result<(), Error> {
        if partition.len() != graph.len() {
            return Err(Error::InputLenMismatch {
                expected: graph.len(),
                actual: partition.len(),
            });
        }
        if weights.len() != graph.len() {
            return Err(Error::InputLenMismatch {
                expected: graph.len(),
                actual: weights.len(),
            });
        }
        if boundary.num_blocks() != config.k {
            return Err(Error::InputLenMismatch {
                expected: config.k,
                actual: boundary.num_blocks(),
            });
        }
        for &block in partition {
            if block >= config.k {
                return Err(Error::BlockOutOfRange {
                    block,
                    num_blocks: config.k,
                });
            }
        }
        Ok(())
    }

    /// One localized multi-try search over the given start nodes: parallel
    /// speculation, commit, reactivation, repeated until the work pool
    /// drains. Returns the realized gain.
    fn start_more_localized_search(
        &mut self,
        config: &PartitionConfig,
        graph: &Graph,
        weights: &[i64],
        partition: &mut [usize],
        boundary: &mut PartitionBoundary,
        init_neighbors: bool,
        mut touched_blocks: Option<&mut FxHashMap<usize, usize>>,
        mut start_nodes: Vec<usize>,
        thread_data: &mut [ThreadData],
        shared: &SharedRefinementData,
        rng: &mut SmallRng,
    ) -> i64 {
        shared.reset_global(boundary);

        start_nodes.shuffle(rng);
        for &node in &start_nodes {
            shared.queue.push(node);
        }

        let mut total_gain_improvement = 0i64;

        // The outer loop keeps the move strategy going while conflicted
        // vertices are reactivated for another parallel phase.
        while !shared.queue.is_empty() {
            {
                let partition_view: &[usize] = partition;
                let (first, rest) = thread_data.split_first_mut().unwrap();
                self.pool.scope(|scope| {
                    for td in rest.iter_mut() {
                        scope.spawn(move |_| {
                            worker_task(
                                td,
                                graph,
                                weights,
                                partition_view,
                                shared,
                                config,
                                init_neighbors,
                            );
                        });
                    }
                    worker_task(
                        first,
                        graph,
                        weights,
                        partition_view,
                        shared,
                        config,
                        init_neighbors,
                    );
                });
            }

            let outcome = apply_moves(
                thread_data,
                graph,
                weights,
                partition,
                boundary,
                shared,
                config,
                touched_blocks.as_deref_mut(),
            );
            assert!(
                outcome.real_gain >= 0,
                "inner iteration worsened the edge cut"
            );
            total_gain_improvement += outcome.real_gain;

            for td in thread_data.iter() {
                self.statistics += &td.stats;
            }
            self.statistics.performed_gain += outcome.real_gain;
            self.statistics.accepted_movements += outcome.accepted;
            self.statistics.unperformed_gain += outcome.unperformed_gain;
            self.statistics.reactivated_vertices += outcome.reactivated.len() as u64;
            self.statistics.phases += 1;

            debug!(
                "phase: gain {} from {} accepted moves, {} reactivated",
                outcome.real_gain,
                outcome.accepted,
                outcome.reactivated.len()
            );

            shared.partial_reset_global(boundary);

            // With no accepted move the authoritative state is unchanged, so
            // retrying the reactivated vertices would replay the same phase.
            if outcome.accepted > 0 {
                for vertex in outcome.reactivated {
                    shared.queue.push(vertex);
                }
            }
        }

        assert!(
            total_gain_improvement >= 0,
            "localized search worsened the edge cut"
        );
        total_gain_improvement
    }

    /// Global refinement: seed from all boundary vertices and run localized
    /// searches to a fixed point, for up to `rounds` rounds. Returns the
    /// total realized gain (non-negative).
    pub fn perform_refinement(
        &mut self,
        config: &PartitionConfig,
        graph: &Graph,
        weights: &[i64],
        partition: &mut [usize],
        boundary: &mut PartitionBoundary,
        rounds: u32,
        init_neighbors: bool,
        alpha: u32,
    ) -> Result<i64, Error> {
        self.validate(config, graph, weights, partition, boundary)?;
        let config = config.with_adaptive_alpha(alpha);

        let shared = SharedRefinementData::new(graph.len(), config.k, self.num_threads);
        let mut thread_data: Vec<ThreadData> = (0..self.num_threads)
            .map(|id| ThreadData::new(id, &config))
            .collect();
        let mut rng = SmallRng::seed_from_u64(config.seed);

        let mut overall_improvement = 0i64;
        for round in 0..rounds {
            let start_nodes = boundary.setup_start_nodes_all(graph, partition);
            if start_nodes.is_empty() {
                break;
            }
            debug!("round {}: {} start nodes", round, start_nodes.len());

            let improvement = self.start_more_localized_search(
                &config,
                graph,
                weights,
                partition,
                boundary,
                init_neighbors,
                None,
                start_nodes,
                &mut thread_data,
                &shared,
                &mut rng,
            );
            self.statistics.rounds += 1;
            if improvement == 0 {
                break;
            }
            overall_improvement += improvement;
        }

        assert!(
            overall_improvement >= 0,
            "refinement worsened the edge cut"
        );
        Ok(overall_improvement)
    }

    /// Localized refinement around the `lhs`/`rhs` interface, for up to
    /// `config.local_multitry_rounds` rounds. Blocks whose contents changed
    /// are recorded in `touched_blocks`.
    pub fn perform_refinement_around_parts(
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
    ) -> Result<i64, Error> {
        self.validate(config, graph, weights, partition, boundary)?;
        for block in [lhs, rhs] {
            if block >= config.k {
                return Err(Error::BlockOutOfRange {
                    block,
                    num_blocks: config.k,
                });
            }
        }
        let config = config.with_adaptive_alpha(alpha);

        let shared = SharedRefinementData::new(graph.len(), config.k, self.num_threads);
        let mut thread_data: Vec<ThreadData> = (0..self.num_threads)
            .map(|id| ThreadData::new(id, &config))
            .collect();
        let mut rng = SmallRng::seed_from_u64(config.seed);

        let mut overall_improvement = 0i64;
        for round in 0..config.local_multitry_rounds {
            let start_nodes =
                boundary.setup_start_nodes_around_blocks(graph, partition, lhs, rhs);
            if start_nodes.is_empty() {
                break;
            }
            debug!(
                "round {} around blocks {}/{}: {} start nodes",
                round,
                lhs,
                rhs,
                start_nodes.len()
            );

            let improvement = self.start_more_localized_search(
                &config,
                graph,
                weights,
                partition,
                boundary,
                init_neighbors,
                Some(&mut *touched_blocks),
                start_nodes,
                &mut thread_data,
                &shared,
                &mut rng,
            );
            self.statistics.rounds += 1;
            if improvement == 0 {
                break;
            }
            overall_improvement += improvement;
        }

        assert!(
            overall_improvement >= 0,
            "refinement worsened the edge cut"
        );
        Ok(overall_improvement)
    }
}

impl KWayRefinement for MultitryKwayFm {
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
    ) -> Result<i64, Error> {
        MultitryKwayFm::perform_refinement(
            self,
            config,
            graph,
            weights,
            partition,
            boundary,
            rounds,
            init_neighbors,
            alpha,
        )
    }

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
    ) -> Result<i64, Error> {
        MultitryKwayFm::perform_refinement_around_parts(
            self,
            config,
            graph,
            weights,
            partition,
            boundary,
            init_neighbors,
            alpha,
            lhs,
            rhs,
            touched_blocks,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(k: usize, upper_bound: i64, num_threads: usize) -> PartitionConfig {
        PartitionConfig {
            num_threads,
            seed: 5,
            k,
            upper_bound_partition: upper_bound,
            ..Default::default()
        }
    }

    fn refine(
        graph: &Graph,
        weights: &[i64],
        partition: &mut [usize],
        config: &PartitionConfig,
    ) -> i64 {
        let mut engine = MultitryKwayFm::new(config).unwrap();
        let mut boundary = PartitionBoundary::new(partition, weights, config.k);
        engine
            .perform_refinement(config, graph, weights, partition, &mut boundary, 10, true, 1)
            .unwrap()
    }

    #[test]
    fn test_triangle_across_two_blocks_has_no_improving_move() {
        // Arrange
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(0, 2, 1);
        let weights = [1, 1, 1];
        let mut partition = [0, 1, 0];
        let config = config_for(2, 2, 1);
        let cut_before = graph.edge_cut(&partition);

        // Act
        let gain = refine(&graph, &weights, &mut partition, &config);

        // Assert
        assert_eq!(gain, 0);
        assert_eq!(graph.edge_cut(&partition), cut_before);
    }

    #[test]
    fn test_already_optimal_path_is_left_alone() {
        // Arrange
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(2, 3, 1);
        let weights = [1, 1, 1, 1];
        let mut partition = [0, 0, 1, 1];
        let config = config_for(2, 2, 1);

        // Act
        let gain = refine(&graph, &weights, &mut partition, &config);

        // Assert
        assert_eq!(gain, 0);
        assert_eq!(partition, [0, 0, 1, 1]);
    }

    #[test]
    fn test_misplaced_singletons_are_pulled_back() {
        // Arrange: alternating blocks on a path cost two extra cut edges.
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(2, 3, 1);
        let weights = [1, 1, 1, 1];
        let mut partition = [0, 1, 0, 1];
        let config = config_for(2, 3, 1);

        // Act
        let gain = refine(&graph, &weights, &mut partition, &config);

        // Assert
        assert_eq!(gain, 2);
        assert_eq!(graph.edge_cut(&partition), 1);
    }

    #[test]
    fn test_balance_constrained_move_is_refused() {
        // Arrange: K4 where vertex 3 would love block 0, but block 0 is full.
        let mut graph = Graph::new();
        for u in 0..4usize {
            for v in (u + 1)..4usize {
                graph.insert_undirected(u, v, 1);
            }
        }
        let weights = [1, 1, 1, 1];
        let mut partition = [0, 0, 0, 1];
        let config = config_for(2, 2, 1);

        // Act
        let gain = refine(&graph, &weights, &mut partition, &config);

        // Assert
        assert_eq!(gain, 0);
        assert_eq!(partition, [0, 0, 0, 1]);
    }

    #[test]
    fn test_concurrent_conflict_is_resolved_deterministically() {
        // Arrange: both endpoints of the heavy cross edge look like great
        // moves to different workers, but committing both would keep the
        // edge cut. Whatever the interleaving, the commit phase must settle
        // on a consistent partition with the full gain.
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(2, 3, 1);
        graph.insert_undirected(1, 2, 10);
        let weights = [1, 1, 1, 1, 1, 1];
        let mut partition = vec![0, 0, 1, 1, 0, 1];
        // Vertices 4 and 5 are isolated; give the matrix its full shape.
        graph.insert(4, 4, 0);
        graph.insert(5, 5, 0);
        let config = config_for(2, 6, 4);
        let cut_before = graph.edge_cut(&partition);

        // Act
        let gain = refine(&graph, &weights, &mut partition, &config);

        // Assert
        assert_eq!(cut_before, 10);
        assert_eq!(gain, 10);
        assert_eq!(graph.edge_cut(&partition), 0);
    }

    #[test]
    fn test_rejected_moves_are_reactivated_and_retried() {
        // Arrange: refining the alternating path leaves a zero-gain move in
        // the rollback tail of the first chain; it must be re-queued and
        // retried in a later inner iteration rather than dropped.
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(2, 3, 1);
        let weights = [1, 1, 1, 1];
        let mut partition = [0, 1, 0, 1];
        let config = config_for(2, 3, 1);
        let mut engine = MultitryKwayFm::new(&config).unwrap();
        let mut boundary = PartitionBoundary::new(&partition, &weights, 2);

        // Act
        let gain = engine
            .perform_refinement(
                &config,
                &graph,
                &weights,
                &mut partition,
                &mut boundary,
                10,
                true,
                1,
            )
            .unwrap();

        // Assert
        assert_eq!(gain, 2);
        assert!(engine.statistics().reactivated_vertices >= 1);
        assert!(engine.statistics().phases >= 2);
    }

    #[test]
    fn test_refinement_around_parts_touches_only_the_pair() {
        // Arrange
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(2, 3, 1);
        let weights = [1, 1, 1, 1];
        let mut partition = vec![0, 1, 0, 1];
        let config = config_for(3, 3, 2);
        let mut engine = MultitryKwayFm::new(&config).unwrap();
        let mut boundary = PartitionBoundary::new(&partition, &weights, 3);
        let mut touched_blocks = FxHashMap::default();

        // Act
        let gain = engine
            .perform_refinement_around_parts(
                &config,
                &graph,
                &weights,
                &mut partition,
                &mut boundary,
                true,
                1,
                0,
                1,
                &mut touched_blocks,
            )
            .unwrap();

        // Assert
        assert_eq!(gain, 2);
        assert_eq!(graph.edge_cut(&partition), 1);
        assert!(touched_blocks.contains_key(&0));
        assert!(touched_blocks.contains_key(&1));
        assert!(!touched_blocks.contains_key(&2));
    }

    #[test]
    fn test_second_call_at_fixed_point_changes_nothing() {
        // Arrange
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(2, 3, 1);
        let weights = [1, 1, 1, 1];
        let mut partition = [0, 1, 0, 1];
        let config = config_for(2, 3, 1);

        // Act
        let first = refine(&graph, &weights, &mut partition, &config);
        let settled = partition;
        let second = refine(&graph, &weights, &mut partition, &config);

        // Assert
        assert_eq!(first, 2);
        assert_eq!(second, 0);
        assert_eq!(partition, settled);
    }

    #[test]
    fn test_gain_is_invariant_across_thread_counts() {
        // Arrange
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(2, 3, 1);
        let weights = [1, 1, 1, 1];

        for num_threads in [1, 4] {
            let mut partition = [0, 1, 0, 1];
            let config = config_for(2, 3, num_threads);

            // Act
            let gain = refine(&graph, &weights, &mut partition, &config);

            // Assert
            assert_eq!(gain, 2, "num_threads = {num_threads}");
            assert_eq!(graph.edge_cut(&partition), 1);
        }
    }

    #[test]
    fn test_performed_gain_accumulates_in_statistics() {
        // Arrange
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(2, 3, 1);
        let weights = [1, 1, 1, 1];
        let mut partition = [0, 1, 0, 1];
        let config = config_for(2, 3, 1);
        let mut engine = MultitryKwayFm::new(&config).unwrap();
        let mut boundary = PartitionBoundary::new(&partition, &weights, 2);

        // Act
        let gain = engine
            .perform_refinement(
                &config,
                &graph,
                &weights,
                &mut partition,
                &mut boundary,
                10,
                true,
                1,
            )
            .unwrap();

        // Assert
        assert_eq!(engine.get_performed_gain(), gain);
        let stats = engine.take_statistics();
        assert_eq!(stats.performed_gain, gain);
        assert_eq!(engine.get_performed_gain(), 0);
    }

    #[test]
    fn test_weighted_ring_converges_and_accounts_exactly() {
        // Arrange: a 12-vertex ring with two chords, random vertex weights
        // and a deliberately scrambled 3-way partition.
        let mut graph = Graph::new();
        for vertex in 0..12usize {
            graph.insert_undirected(vertex, (vertex + 1) % 12, 1 + (vertex % 3) as i64);
        }
        graph.insert_undirected(0, 6, 2);
        graph.insert_undirected(3, 9, 2);
        let weights = crate::gen_weights::gen_random_weights(12, 1, 3, 7);
        let mut partition: Vec<usize> = (0..12).map(|vertex| (vertex * 5) % 3).collect();
        let total: i64 = weights.iter().sum();
        let config = config_for(3, total, 2);
        let cut_before = graph.edge_cut(&partition);

        // Act
        let gain = refine(&graph, &weights, &mut partition, &config);
        let cut_after = graph.edge_cut(&partition);

        // Assert
        assert!(gain > 0);
        assert_eq!(gain, cut_before - cut_after);
        let loads =
            crate::balance::compute_block_loads(&partition, 3, weights.iter().cloned());
        assert_eq!(loads.iter().sum::<i64>(), total);
    }

    #[test]
    fn test_mismatched_inputs_are_rejected() {
        // Arrange
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        let weights = [1, 1];
        let mut partition = vec![0];
        let config = config_for(2, 2, 1);
        let mut engine = MultitryKwayFm::new(&config).unwrap();
        let mut boundary = PartitionBoundary::new(&[0, 1], &weights, 2);

        // Act
        let result = engine.perform_refinement(
            &config,
            &graph,
            &weights,
            &mut partition,
            &mut boundary,
            1,
            true,
            1,
        );

        // Assert
        assert!(matches!(result, Err(Error::InputLenMismatch { .. })));
    }

    #[test]
    fn test_out_of_range_block_is_rejected() {
        // Arrange
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        let weights = [1, 1];
        let mut partition = vec![0, 7];
        let config = config_for(2, 2, 1);
        let mut engine = MultitryKwayFm::new(&config).unwrap();
        let mut boundary = PartitionBoundary::new(&[0, 1], &weights, 2);

        // Act
        let result = engine.perform_refinement(
            &config,
            &graph,
            &weights,
            &mut partition,
            &mut boundary,
            1,
            true,
            1,
        );

        // Assert
        assert!(matches!(
            result,
            Err(Error::BlockOutOfRange { block: 7, .. })
        ));
    }
}
