/// Termination rule for a single FM chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KWayStopRule {
    /// Stop after `step_limit` non-improving moves since the best prefix.
    Simple,

    /// Stop after `alpha * step_limit` non-improving moves since the best
    /// prefix. Both refinement entry points force this rule for the duration
    /// of the call.
    Adaptive,
}

/// Configuration consumed by the refinement engine.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Size of the worker set. The calling thread participates as worker 0.
    pub num_threads: usize,

    /// RNG seed base. Worker `id` seeds its generator with `seed + id`.
    pub seed: u64,

    /// Number of blocks of the partition.
    pub k: usize,

    /// The maximum weight any single block may reach (Lmax). A move whose
    /// target block would exceed this bound is infeasible.
    pub upper_bound_partition: i64,

    /// Termination rule for FM chains.
    pub kway_stop_rule: KWayStopRule,

    /// Alpha parameter of the adaptive stop rule.
    pub kway_adaptive_limits_alpha: u32,

    /// Cap on the number of outer rounds when refining around a block pair.
    pub local_multitry_rounds: u32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfig {
            num_threads: 1,
            seed: 0,
            k: 2,
            upper_bound_partition: i64::MAX,
            kway_stop_rule: KWayStopRule::Adaptive,
            kway_adaptive_limits_alpha: 1,
            local_multitry_rounds: 10,
        }
    }
}

impl PartitionConfig {
    /// A copy of this configuration with the stop rule and alpha the entry
    /// points impose for the duration of a refinement call.
    pub(crate) fn with_adaptive_alpha(&self, alpha: u32) -> Self {
        let mut config = self.clone();
        config.kway_stop_rule = KWayStopRule::Adaptive;
        config.kway_adaptive_limits_alpha = alpha;
        config
    }
}
