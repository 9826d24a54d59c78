use std::fmt;
use std::ops::AddAssign;

/// Telemetry of one or more refinement calls.
///
/// A plain value merged per call; long-lived aggregation across calls is the
/// caller's job. All gain figures are edge-weight units.
#[derive(Debug, Clone, Default)]
pub struct RefinementStatistics {
    /// Moves attempted by the speculative chains (including skips on lost
    /// claim races).
    pub tried_movements: u64,

    /// Moves accepted by the commit phase.
    pub accepted_movements: u64,

    /// Neighbor gain recomputations performed by the chains.
    pub scanned_neighbours: u64,

    /// Gain actually realized on the authoritative partition.
    pub performed_gain: i64,

    /// Gain claimed by speculative chains but discarded at commit.
    pub unperformed_gain: i64,

    /// Sum of the chains' own best-prefix gains, an upper bound on what the
    /// commit phase can realize.
    pub upper_bound_gain: i64,

    /// Vertices re-queued after their speculative move was rejected.
    pub reactivated_vertices: u64,

    /// Chains that ended because their priority queue drained.
    pub stop_empty_queue: u64,

    /// Chains that ended through the adaptive stopping rule.
    pub stop_stopping_rule: u64,

    /// Chains that ended at the per-chain move cap.
    pub stop_max_number_of_swaps: u64,

    /// Worker tasks that returned early through the global 5%-moved rule.
    pub stop_fraction_of_nodes_moved: u64,

    /// Parallel phases executed (speculation + commit cycles).
    pub phases: u64,

    /// Outer rounds executed.
    pub rounds: u64,
}

impl AddAssign<&RefinementStatistics> for RefinementStatistics {
    fn add_assign(&mut self, other: &RefinementStatistics) {
        self.tried_movements += other.tried_movements;
        self.accepted_movements += other.accepted_movements;
        self.scanned_neighbours += other.scanned_neighbours;
        self.performed_gain += other.performed_gain;
        self.unperformed_gain += other.unperformed_gain;
        self.upper_bound_gain += other.upper_bound_gain;
        self.reactivated_vertices += other.reactivated_vertices;
        self.stop_empty_queue += other.stop_empty_queue;
        self.stop_stopping_rule += other.stop_stopping_rule;
        self.stop_max_number_of_swaps += other.stop_max_number_of_swaps;
        self.stop_fraction_of_nodes_moved += other.stop_fraction_of_nodes_moved;
        self.phases += other.phases;
        self.rounds += other.rounds;
    }
}

impl fmt::Display for RefinementStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total rounds\t{}", self.rounds)?;
        writeln!(f, "Total parallel phases\t{}", self.phases)?;
        writeln!(f, "Total tried moves\t{}", self.tried_movements)?;
        writeln!(f, "Total accepted moves\t{}", self.accepted_movements)?;
        writeln!(f, "Total scanned neighbours\t{}", self.scanned_neighbours)?;
        writeln!(f, "Total performed gain\t{}", self.performed_gain)?;
        writeln!(f, "Total unperformed gain\t{}", self.unperformed_gain)?;
        writeln!(f, "Total upper bound gain\t{}", self.upper_bound_gain)?;
        writeln!(f, "Total reactivated vertices\t{}", self.reactivated_vertices)?;
        writeln!(f, "Total stop empty queue\t{}", self.stop_empty_queue)?;
        writeln!(f, "Total stop stopping rule\t{}", self.stop_stopping_rule)?;
        writeln!(
            f,
            "Total stop max number of swaps\t{}",
            self.stop_max_number_of_swaps
        )?;
        write!(
            f,
            "Total stop fraction of nodes moved\t{}",
            self.stop_fraction_of_nodes_moved
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sums_counters() {
        // Arrange
        let mut total = RefinementStatistics {
            tried_movements: 3,
            performed_gain: 10,
            stop_empty_queue: 1,
            ..Default::default()
        };
        let other = RefinementStatistics {
            tried_movements: 2,
            performed_gain: -4,
            stop_empty_queue: 2,
            ..Default::default()
        };

        // Act
        total += &other;

        // Assert
        assert_eq!(total.tried_movements, 5);
        assert_eq!(total.performed_gain, 6);
        assert_eq!(total.stop_empty_queue, 3);
    }

    #[test]
    fn test_display_mentions_performed_gain() {
        // Arrange
        let stats = RefinementStatistics {
            performed_gain: 42,
            ..Default::default()
        };

        // Act
        let rendered = stats.to_string();

        // Assert
        assert!(rendered.contains("Total performed gain\t42"));
    }
}
