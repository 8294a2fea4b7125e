//! Placement Policy
//!
//! Pure domain logic for choosing which adapter should take a new binding.
//! The pool supplies a cursor and the last known binding count of each
//! adapter; the policy returns the order in which adapters are tried.

use std::fmt;
use std::str::FromStr;

/// Strategy for spreading bindings across adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Cycle through adapters in configuration order
    RoundRobin,
    /// Prefer the adapter with the fewest known bindings
    #[default]
    LeastBindings,
}

impl PlacementPolicy {
    /// Order in which adapter indices should be tried.
    ///
    /// # Arguments
    /// * `n` - Number of adapters in the pool
    /// * `cursor` - Rotating start position, advanced by the caller per create
    /// * `loads` - Last known binding count per adapter (missing entries count as 0)
    ///
    /// Every index in `0..n` appears exactly once. Ties under
    /// `LeastBindings` are broken by rotation from `cursor`, so equal
    /// adapters still share the work.
    pub fn candidate_order(&self, n: usize, cursor: usize, loads: &[usize]) -> Vec<usize> {
        if n == 0 {
            return Vec::new();
        }

        let start = cursor % n;
        let mut order: Vec<usize> = (0..n).map(|i| (start + i) % n).collect();

        if *self == Self::LeastBindings {
            // Stable sort keeps the rotation among equal loads
            order.sort_by_key(|&i| loads.get(i).copied().unwrap_or(0));
        }

        order
    }
}

impl FromStr for PlacementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "round-robin" | "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "least-bindings" | "least_bindings" | "leastbindings" => Ok(Self::LeastBindings),
            other => Err(format!("unknown placement policy: {}", other)),
        }
    }
}

impl fmt::Display for PlacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round-robin"),
            Self::LeastBindings => write!(f, "least-bindings"),
        }
    }
}
