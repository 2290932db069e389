//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(scope, stream)`
//! pair, e.g. `("trial", 3)` or `("fold", 0)`. Sub-seeds are derived via BLAKE3
//! hashing, independently of thread scheduling order, so results are identical
//! regardless of thread count.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Deterministic RNG hierarchy.
#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a specific `(scope, stream)`.
    ///
    /// Calling `sub_seed("trial", 0)` then `sub_seed("trial", 1)` produces the
    /// same results as calling them in reverse order.
    pub fn sub_seed(&self, scope: &str, stream: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(scope.as_bytes());
        hasher.update(&stream.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    /// Create a seeded StdRng from a sub-seed.
    pub fn rng_for(&self, scope: &str, stream: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(scope, stream))
    }

    /// Child hierarchy rooted at a sub-seed, for nesting (e.g. rounds within a trial).
    pub fn child(&self, scope: &str, stream: u64) -> RngHierarchy {
        RngHierarchy::new(self.sub_seed(scope, stream))
    }
}
