use std::fmt;

/// Counters collected during one traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraversalStats {
    /// `pair` invocations
    pub recursions: u64,
    /// Leaf × leaf base cases run
    pub base_cases: u64,
    /// Point pairs handed to the pair visitor
    pub pair_visits: u64,
    /// Node pairs dropped by the intrinsic check
    pub intrinsic_prunes: u64,
    /// Node pairs dropped by query termination
    pub termination_prunes: u64,
    /// Node pairs dropped by the extrinsic check
    pub extrinsic_prunes: u64,
    /// Query-side splits
    pub query_splits: u64,
    /// Reference-side splits
    pub reference_splits: u64,
    /// Deepest `pair` nesting reached
    pub max_depth: usize,
}

impl TraversalStats {
    /// All node pairs resolved without recursion
    pub fn total_prunes(&self) -> u64 {
        self.intrinsic_prunes + self.termination_prunes + self.extrinsic_prunes
    }

    /// One-line summary suitable for logs
    pub fn report(&self) -> String {
        format!(
            "recursions={} base_cases={} pair_visits={} prunes(intrinsic={} termination={} extrinsic={}) splits(q={} r={}) max_depth={}",
            self.recursions,
            self.base_cases,
            self.pair_visits,
            self.intrinsic_prunes,
            self.termination_prunes,
            self.extrinsic_prunes,
            self.query_splits,
            self.reference_splits,
            self.max_depth,
        )
    }
}

impl fmt::Display for TraversalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report())
    }
}
