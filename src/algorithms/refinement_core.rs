// Per-thread machinery of the multi-try FM engine: the gain oracle, the
// speculative localized FM chain, and the single-threaded commit phase that
// reconciles all speculative chains against the authoritative partition.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::algorithms::multitry_fm::SharedRefinementData;
use crate::algorithms::RefinementStatistics;
use crate::boundary::PartitionBoundary;
use crate::config::{KWayStopRule, PartitionConfig};
use crate::graph::Graph;

/// Number of non-improving moves a chain tolerates before the stopping rule
/// triggers (scaled by alpha under the adaptive rule).
const STEP_LIMIT: u64 = 50;

/// One record of a thread's transposition log: a speculative move of
/// `vertex` from block `from` to block `to`, with the gain the move had in
/// the thread's local view at the time it was made.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Transposition {
    pub vertex: usize,
    pub from: usize,
    pub to: usize,
    pub gain: i64,
}

/// The slice of a thread's transposition log produced by one chain.
///
/// Records `[start, best_end)` form the min-cut prefix (the commit
/// candidate); `[best_end, end)` is the rollback tail.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChainBounds {
    pub start: usize,
    pub best_end: usize,
    pub end: usize,
}

/// Result of one speculative chain.
pub(crate) struct ChainOutcome {
    /// Cumulative gain of the min-cut prefix in the thread's local view.
    pub improvement: i64,

    /// Number of tentative moves the chain appended to the log.
    pub moved: usize,
}

/// Why a chain terminated.
enum StopReason {
    EmptyQueue,
    StoppingRule,
    MaxNumberOfSwaps,
}

/// Reusable scratch for gain computation: edge-weight connectivity of one
/// vertex towards each block, with a touched list so clearing is O(degree)
/// instead of O(k).
pub(crate) struct GainOracle {
    conn: Vec<i64>,
    touched: Vec<usize>,
}

impl GainOracle {
    pub fn new(num_blocks: usize) -> Self {
        GainOracle {
            conn: vec![0; num_blocks],
            touched: Vec::new(),
        }
    }

    /// Compute the best move for `vertex` out of block `from`.
    ///
    /// Neighbor blocks are resolved through `block_of`, so the same oracle
    /// serves both the speculative chains (shadow over shared state) and the
    /// commit phase (authoritative state). Returns the best feasible target
    /// block, the gain of moving there (external connectivity to the target
    /// minus internal connectivity), and the external degree of the vertex.
    /// Ties on external connectivity go to the lowest block id.
    pub fn best_move(
        &mut self,
        graph: &Graph,
        weights: &[i64],
        block_of: impl Fn(usize) -> usize,
        vertex: usize,
        from: usize,
        balance_ok: impl Fn(usize, i64) -> bool,
    ) -> (Option<usize>, i64, i64) {
        for (neighbor, edge_weight) in graph.neighbors(vertex) {
            let block = block_of(neighbor);
            if self.conn[block] == 0 {
                self.touched.push(block);
            }
            self.conn[block] += edge_weight;
        }

        let internal = self.conn[from];
        let vertex_weight = weights[vertex];
        let mut external_degree = 0;
        let mut best: Option<(usize, i64)> = None;

        self.touched.sort_unstable();
        for &block in &self.touched {
            if block == from {
                continue;
            }
            let external = self.conn[block];
            external_degree += external;

            let improves = match best {
                None => true,
                Some((_, best_external)) => external > best_external,
            };
            if improves && balance_ok(block, vertex_weight) {
                best = Some((block, external));
            }
        }

        for &block in &self.touched {
            self.conn[block] = 0;
        }
        self.touched.clear();

        match best {
            Some((block, external)) => (Some(block), external - internal, external_degree),
            None => (None, 0, external_degree),
        }
    }
}

/// Max-heap entry of the per-thread FM priority queue. Equal gains are
/// ordered by an RNG salt drawn at insertion, so the pop order is
/// deterministic for a fixed seed and thread count.
#[derive(Debug, PartialEq, Eq)]
struct PqEntry {
    gain: i64,
    salt: u32,
    vertex: usize,
}

impl Ord for PqEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .cmp(&other.gain)
            .then(self.salt.cmp(&other.salt))
            .then(self.vertex.cmp(&other.vertex))
    }
}

impl PartialOrd for PqEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Thread-local state of one refinement worker.
///
/// The shadow map overrides the shared partition for vertices this worker
/// moved speculatively during the current parallel phase; it contains
/// exactly the vertices present in the transposition log.
pub(crate) struct ThreadData {
    pub id: usize,
    rng: SmallRng,
    shadow: FxHashMap<usize, usize>,
    pub transpositions: Vec<Transposition>,
    pub chains: Vec<ChainBounds>,
    queue: BinaryHeap<PqEntry>,
    keys: FxHashMap<usize, i64>,
    oracle: GainOracle,
    pub start_nodes: Vec<usize>,
    pub stats: RefinementStatistics,
}

impl ThreadData {
    pub fn new(id: usize, config: &PartitionConfig) -> Self {
        ThreadData {
            id,
            rng: SmallRng::seed_from_u64(config.seed + id as u64),
            shadow: FxHashMap::default(),
            transpositions: Vec::new(),
            chains: Vec::new(),
            queue: BinaryHeap::new(),
            keys: FxHashMap::default(),
            oracle: GainOracle::new(config.k),
            start_nodes: Vec::new(),
            stats: RefinementStatistics::default(),
        }
    }

    /// Clear all per-phase state. Called at the start of every worker task;
    /// the statistics have been merged by the driver by then.
    pub fn reset(&mut self) {
        self.shadow.clear();
        self.transpositions.clear();
        self.chains.clear();
        self.queue.clear();
        self.keys.clear();
        self.start_nodes.clear();
        self.stats = RefinementStatistics::default();
    }

    /// The block of `vertex` in this worker's local view: the speculative
    /// shadow entry if present, the shared partition otherwise.
    pub fn local_block_of(&self, partition: &[usize], vertex: usize) -> usize {
        self.shadow
            .get(&vertex)
            .copied()
            .unwrap_or(partition[vertex])
    }

    /// Gain-oracle query in this worker's local view.
    pub fn compute_gain(
        &mut self,
        graph: &Graph,
        weights: &[i64],
        partition: &[usize],
        balance_ok: impl Fn(usize, i64) -> bool,
        vertex: usize,
        from: usize,
    ) -> (Option<usize>, i64, i64) {
        let shadow = &self.shadow;
        self.oracle.best_move(
            graph,
            weights,
            |v| shadow.get(&v).copied().unwrap_or(partition[v]),
            vertex,
            from,
            balance_ok,
        )
    }

    fn pq_insert(&mut self, vertex: usize, gain: i64) {
        let salt = self.rng.gen::<u32>();
        self.keys.insert(vertex, gain);
        self.queue.push(PqEntry { gain, salt, vertex });
    }

    fn pq_remove(&mut self, vertex: usize) {
        self.keys.remove(&vertex);
    }

    fn pq_contains(&self, vertex: usize) -> bool {
        self.keys.contains_key(&vertex)
    }

    /// Pop the highest-gain live entry, skipping entries whose key was
    /// superseded by a later insert or a removal.
    fn pq_pop(&mut self) -> Option<(usize, i64)> {
        while let Some(entry) = self.queue.pop() {
            match self.keys.get(&entry.vertex) {
                Some(&gain) if gain == entry.gain => {
                    self.keys.remove(&entry.vertex);
                    return Some((entry.vertex, entry.gain));
                }
                _ => continue,
            }
        }
        None
    }

    fn pq_clear(&mut self) {
        self.queue.clear();
        self.keys.clear();
    }
}

/// Run one speculative FM chain over the worker's local view, seeded from
/// `td.start_nodes`.
///
/// Moves are tentative: they touch only the shadow map, the transposition
/// log and the shared atomic block weights. The chain records its min-cut
/// prefix in `td.chains` for the commit phase; a chain that makes no move
/// records nothing.
pub(crate) fn single_refinement_round(
    td: &mut ThreadData,
    graph: &Graph,
    weights: &[i64],
    partition: &[usize],
    shared: &SharedRefinementData,
    config: &PartitionConfig,
) -> ChainOutcome {
    let chain_start = td.transpositions.len();
    let max_number_of_swaps = graph.len() as u64;
    let stop_limit = match config.kway_stop_rule {
        KWayStopRule::Simple => STEP_LIMIT,
        KWayStopRule::Adaptive => config.kway_adaptive_limits_alpha as u64 * STEP_LIMIT,
    };
    let balance_ok = |block: usize, weight: i64| {
        shared.tentative_block_weight(block) + weight <= config.upper_bound_partition
    };

    td.pq_clear();
    for i in 0..td.start_nodes.len() {
        let vertex = td.start_nodes[i];
        let from = td.local_block_of(partition, vertex);
        let (target, gain, _) =
            td.compute_gain(graph, weights, partition, balance_ok, vertex, from);
        if target.is_some() {
            td.pq_insert(vertex, gain);
        }
    }

    let mut cumulative_gain = 0i64;
    let mut best_gain = 0i64;
    let mut best_end = chain_start;
    let mut swaps = 0u64;
    let mut swaps_since_best = 0u64;

    let stop_reason = loop {
        let Some((vertex, _)) = td.pq_pop() else {
            break StopReason::EmptyQueue;
        };
        td.stats.tried_movements += 1;

        // claim() returns the prior value; true means another worker won.
        if shared.claim(vertex) {
            continue;
        }

        let from = td.local_block_of(partition, vertex);
        let (target, gain, _) =
            td.compute_gain(graph, weights, partition, balance_ok, vertex, from);
        let Some(to) = target else {
            // The move became infeasible between insertion and pop; the
            // vertex was never moved, so it must not stay pinned.
            shared.unclaim(vertex);
            continue;
        };

        td.shadow.insert(vertex, to);
        td.transpositions.push(Transposition {
            vertex,
            from,
            to,
            gain,
        });
        shared.move_tentative_weight(from, to, weights[vertex]);

        cumulative_gain += gain;
        swaps += 1;
        if cumulative_gain > best_gain {
            best_gain = cumulative_gain;
            best_end = td.transpositions.len();
            swaps_since_best = 0;
        } else {
            swaps_since_best += 1;
        }

        for (neighbor, _) in graph.neighbors(vertex) {
            if shared.is_claimed(neighbor) {
                continue;
            }
            td.stats.scanned_neighbours += 1;
            let neighbor_from = td.local_block_of(partition, neighbor);
            let (neighbor_target, neighbor_gain, external_degree) =
                td.compute_gain(graph, weights, partition, balance_ok, neighbor, neighbor_from);
            if td.pq_contains(neighbor) {
                match neighbor_target {
                    Some(_) => td.pq_insert(neighbor, neighbor_gain),
                    None => td.pq_remove(neighbor),
                }
            } else if external_degree > 0 && neighbor_target.is_some() {
                td.pq_insert(neighbor, neighbor_gain);
            }
        }

        if swaps >= max_number_of_swaps {
            break StopReason::MaxNumberOfSwaps;
        }
        if swaps_since_best >= stop_limit {
            break StopReason::StoppingRule;
        }
    };

    match stop_reason {
        StopReason::EmptyQueue => td.stats.stop_empty_queue += 1,
        StopReason::StoppingRule => td.stats.stop_stopping_rule += 1,
        StopReason::MaxNumberOfSwaps => td.stats.stop_max_number_of_swaps += 1,
    }

    let end = td.transpositions.len();
    assert!(
        best_gain >= 0,
        "chain produced a negative best-prefix gain"
    );
    if end > chain_start {
        td.chains.push(ChainBounds {
            start: chain_start,
            best_end,
            end,
        });
    }

    ChainOutcome {
        improvement: best_gain,
        moved: end - chain_start,
    }
}

/// Result of the commit phase.
pub(crate) struct CommitOutcome {
    /// Exact decrease of the edge cut realized on the authoritative
    /// partition.
    pub real_gain: i64,

    /// Number of moves applied.
    pub accepted: u64,

    /// Speculative gain that was discarded (rejected moves and rollback
    /// tails).
    pub unperformed_gain: i64,

    /// Vertices whose speculative move was not applied; they are re-queued
    /// for the next inner phase.
    pub reactivated: Vec<usize>,
}

/// Single-threaded reconciliation of all speculative chains against the
/// authoritative partition (all workers have joined).
///
/// Workers are processed in ascending thread id and chains in production
/// order, so the commit is deterministic given identical per-thread output.
/// Each record of a chain's min-cut prefix is re-validated: its gain is
/// re-derived against authoritative state and the move is applied only if
/// the best target is still the recorded one (which implies the balance
/// constraint holds) and the vertex was not already committed this pass.
/// The accepted subsequence of each chain is then itself rolled back to its
/// best cumulative-gain prefix, so no chain ever contributes a negative
/// amount. Rejected and rolled-back vertices are unclaimed and reactivated.
pub(crate) fn apply_moves(
    thread_data: &mut [ThreadData],
    graph: &Graph,
    weights: &[i64],
    partition: &mut [usize],
    boundary: &mut PartitionBoundary,
    shared: &SharedRefinementData,
    config: &PartitionConfig,
    mut touched_blocks: Option<&mut FxHashMap<usize, usize>>,
) -> CommitOutcome {
    let mut oracle = GainOracle::new(config.k);
    let mut committed: FxHashSet<usize> = FxHashSet::default();

    let mut real_gain = 0i64;
    let mut accepted = 0u64;
    let mut unperformed_gain = 0i64;
    let mut reactivated = Vec::new();

    for td in thread_data.iter() {
        for chain in &td.chains {
            debug_assert!(chain.start <= chain.best_end && chain.best_end <= chain.end);
            debug_assert!(chain.end <= td.transpositions.len());

            let mut chain_gain = 0i64;
            let mut chain_best_gain = 0i64;
            let mut applied: Vec<usize> = Vec::new();
            let mut applied_best = 0usize;

            for index in chain.start..chain.best_end {
                let record = td.transpositions[index];
                let mut accept = false;
                let mut recomputed_gain = 0i64;

                if partition[record.vertex] == record.from && !committed.contains(&record.vertex)
                {
                    let (target, gain, _) = oracle.best_move(
                        graph,
                        weights,
                        |v| partition[v],
                        record.vertex,
                        record.from,
                        |block, weight| {
                            boundary.block_weight(block) + weight <= config.upper_bound_partition
                        },
                    );
                    if target == Some(record.to) {
                        accept = true;
                        recomputed_gain = gain;
                    }
                }

                if accept {
                    partition[record.vertex] = record.to;
                    boundary.register_move(record.from, record.to, weights[record.vertex]);
                    committed.insert(record.vertex);
                    if let Some(map) = touched_blocks.as_deref_mut() {
                        map.insert(record.from, record.from);
                        map.insert(record.to, record.to);
                    }
                    chain_gain += recomputed_gain;
                    applied.push(index);
                    if chain_gain > chain_best_gain {
                        chain_best_gain = chain_gain;
                        applied_best = applied.len();
                    }
                } else {
                    unperformed_gain += record.gain;
                    shared.unclaim(record.vertex);
                    reactivated.push(record.vertex);
                }
            }

            // Unroll accepted moves past the best prefix of this chain.
            for &index in applied[applied_best..].iter().rev() {
                let record = td.transpositions[index];
                partition[record.vertex] = record.from;
                boundary.register_move(record.to, record.from, weights[record.vertex]);
                committed.remove(&record.vertex);
                shared.unclaim(record.vertex);
                reactivated.push(record.vertex);
                unperformed_gain += record.gain;
            }
            accepted += applied_best as u64;
            real_gain += chain_best_gain;

            // The rollback tail is reactivated rather than discarded; a
            // different interleaving may keep those vertices.
            for index in chain.best_end..chain.end {
                let record = td.transpositions[index];
                unperformed_gain += record.gain;
                shared.unclaim(record.vertex);
                reactivated.push(record.vertex);
            }
        }
    }

    assert!(real_gain >= 0, "commit produced a negative real gain");

    CommitOutcome {
        real_gain,
        accepted,
        unperformed_gain,
        reactivated,
    }
}
