/// Configuration parameters for one dual-tree traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Skip the recursion: after the root intrinsic check, run one base case
    /// over the full query × reference ranges.
    pub naive: bool,
    /// Query and reference sets are the same point set in the same tree
    /// order; the base case skips `q_index == r_index`.
    pub leave_one_out: bool,
    /// Verify summary refinement, flush completeness and handle release.
    pub check_invariants: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            naive: false,
            leave_one_out: false,
            check_invariants: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    /// Pruned traversal with default checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exhaustive cross-validation run.
    pub fn naive() -> Self {
        Self::default().with_naive(true)
    }

    /// Enable or disable naive mode.
    pub fn with_naive(mut self, enabled: bool) -> Self {
        self.naive = enabled;
        self
    }

    /// Enable or disable self-pair exclusion.
    pub fn with_leave_one_out(mut self, enabled: bool) -> Self {
        self.leave_one_out = enabled;
        self
    }

    /// Enable or disable invariant checks.
    pub fn with_invariant_checks(mut self, enabled: bool) -> Self {
        self.check_invariants = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = EngineConfig::naive().with_leave_one_out(true).with_invariant_checks(false);
        assert!(config.naive);
        assert!(config.leave_one_out);
        assert!(!config.check_invariants);
        assert!(!EngineConfig::new().naive);
    }
}
