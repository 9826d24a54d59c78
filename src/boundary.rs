use crate::balance::compute_block_loads;
use crate::graph::Graph;

/// Authoritative per-block bookkeeping for a partition under refinement.
///
/// Holds the ground-truth block weights and sizes the commit phase validates
/// against, and enumerates boundary vertices as starting points for the
/// localized searches. Boundary membership is recomputed by scan on each
/// setup call; only the weight and size counters are maintained
/// incrementally through [`PartitionBoundary::register_move`].
pub struct PartitionBoundary {
    block_weights: Vec<i64>,
    block_sizes: Vec<usize>,
}

impl PartitionBoundary {
    /// Build the block bookkeeping from a partition and vertex weights.
    pub fn new(partition: &[usize], weights: &[i64], num_blocks: usize) -> Self {
        debug_assert_eq!(partition.len(), weights.len());

        let block_weights = compute_block_loads(partition, num_blocks, weights.iter().cloned());
        let mut block_sizes = vec![0usize; num_blocks];
        for &block in partition {
            block_sizes[block] += 1;
        }

        PartitionBoundary {
            block_weights,
            block_sizes,
        }
    }

    /// The number of blocks tracked.
    pub fn num_blocks(&self) -> usize {
        self.block_weights.len()
    }

    /// The total vertex weight currently assigned to `block`.
    pub fn block_weight(&self, block: usize) -> i64 {
        self.block_weights[block]
    }

    /// The number of vertices currently assigned to `block`.
    pub fn block_size(&self, block: usize) -> usize {
        self.block_sizes[block]
    }

    /// All boundary vertices of the partition, i.e. vertices with at least
    /// one neighbor in a different block.
    pub fn setup_start_nodes_all(&self, graph: &Graph, partition: &[usize]) -> Vec<usize> {
        (0..graph.len())
            .filter(|&vertex| {
                graph
                    .neighbors(vertex)
                    .any(|(neighbor, _)| partition[neighbor] != partition[vertex])
            })
            .collect()
    }

    /// The boundary vertices on the interface between `lhs` and `rhs`:
    /// vertices of either block with a neighbor in the other.
    pub fn setup_start_nodes_around_blocks(
        &self,
        graph: &Graph,
        partition: &[usize],
        lhs: usize,
        rhs: usize,
    ) -> Vec<usize> {
        (0..graph.len())
            .filter(|&vertex| {
                let block = partition[vertex];
                let other = if block == lhs {
                    rhs
                } else if block == rhs {
                    lhs
                } else {
                    return false;
                };
                graph
                    .neighbors(vertex)
                    .any(|(neighbor, _)| partition[neighbor] == other)
            })
            .collect()
    }

    /// Record an accepted move of a vertex of weight `weight` from block
    /// `from` to block `to`. Called by the commit phase; undoing a move is
    /// the same call with `from` and `to` swapped.
    pub fn register_move(&mut self, from: usize, to: usize, weight: i64) {
        self.block_weights[from] -= weight;
        self.block_weights[to] += weight;
        self.block_sizes[from] -= 1;
        self.block_sizes[to] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph() -> Graph {
        let mut graph = Graph::new();
        graph.insert_undirected(0, 1, 1);
        graph.insert_undirected(1, 2, 1);
        graph.insert_undirected(2, 3, 1);
        graph
    }

    #[test]
    fn test_block_weights_and_sizes() {
        // Arrange
        let partition = [0, 0, 1, 1];
        let weights = [2, 3, 4, 5];

        // Act
        let boundary = PartitionBoundary::new(&partition, &weights, 2);

        // Assert
        assert_eq!(boundary.block_weight(0), 5);
        assert_eq!(boundary.block_weight(1), 9);
        assert_eq!(boundary.block_size(0), 2);
        assert_eq!(boundary.block_size(1), 2);
    }

    #[test]
    fn test_setup_start_nodes_all() {
        // Arrange
        let graph = path_graph();
        let partition = [0, 0, 1, 1];
        let weights = [1, 1, 1, 1];
        let boundary = PartitionBoundary::new(&partition, &weights, 2);

        // Act
        let start_nodes = boundary.setup_start_nodes_all(&graph, &partition);

        // Assert
        assert_eq!(start_nodes, vec![1, 2]);
    }

    #[test]
    fn test_setup_start_nodes_around_blocks() {
        // Arrange
        let graph = path_graph();
        let partition = [0, 1, 2, 2];
        let weights = [1, 1, 1, 1];
        let boundary = PartitionBoundary::new(&partition, &weights, 3);

        // Act
        let around_0_1 = boundary.setup_start_nodes_around_blocks(&graph, &partition, 0, 1);
        let around_1_2 = boundary.setup_start_nodes_around_blocks(&graph, &partition, 1, 2);

        // Assert
        assert_eq!(around_0_1, vec![0, 1]);
        assert_eq!(around_1_2, vec![1, 2]);
    }

    #[test]
    fn test_register_move_keeps_totals() {
        // Arrange
        let partition = [0, 0, 1, 1];
        let weights = [2, 3, 4, 5];
        let mut boundary = PartitionBoundary::new(&partition, &weights, 2);
        let total: i64 = weights.iter().sum();

        // Act
        boundary.register_move(0, 1, 3);

        // Assert
        assert_eq!(boundary.block_weight(0), 2);
        assert_eq!(boundary.block_weight(1), 12);
        assert_eq!(boundary.block_weight(0) + boundary.block_weight(1), total);
        assert_eq!(boundary.block_size(0), 1);
        assert_eq!(boundary.block_size(1), 3);

        // Act (undo)
        boundary.register_move(1, 0, 3);

        // Assert
        assert_eq!(boundary.block_weight(0), 5);
        assert_eq!(boundary.block_size(0), 2);
    }
}
