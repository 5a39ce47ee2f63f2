//! Deterministic random number generation.
//!
//! RULE: Nothing in the engine may call any platform RNG.
//! All randomness flows through StreamRng instances derived from the
//! single master seed carried in AnalysisParams.
//!
//! Each module gets its own RNG stream, seeded deterministically from
//! (master_seed, module_slot). Simulation trials additionally fold in
//! (category_index, trial_index), so every trial owns an independent,
//! reproducible stream regardless of execution order across workers.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

const MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// A deterministic RNG stream for one module (or one simulation trial).
pub struct StreamRng {
    inner: Pcg64Mcg,
}

impl StreamRng {
    fn from_seed(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Roll a usize index in [0, n). Convenience for resampling.
    pub fn next_index(&mut self, n: usize) -> usize {
        self.next_u64_below(n as u64) as usize
    }

    /// Fisher-Yates shuffle of an index slice.
    pub fn shuffle(&mut self, indices: &mut [usize]) {
        for i in (1..indices.len()).rev() {
            let j = self.next_index(i + 1);
            indices.swap(i, j);
        }
    }
}

/// All module RNG streams for one run, derived from the master seed.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_module(&self, slot: ModuleSlot) -> StreamRng {
        StreamRng::from_seed(self.master_seed ^ (slot as u64).wrapping_mul(MIX))
    }

    /// Stream for a single simulation trial. Independent of every other
    /// trial's stream, so trials can run on any worker in any order.
    pub fn for_trial(&self, slot: ModuleSlot, category_index: u64, trial: u64) -> StreamRng {
        let s = self.master_seed
            ^ (slot as u64).wrapping_mul(MIX)
            ^ category_index.wrapping_mul(0xbf58_476d_1ce4_e5b9)
            ^ trial.wrapping_mul(0x94d0_49bb_1331_11eb);
        StreamRng::from_seed(s)
    }
}

/// Stable module slot assignments.
/// NEVER reorder or remove entries — only append.
/// Reordering changes every module's stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum ModuleSlot {
    Kpi = 0,
    AbSingle = 1,
    AbSimulation = 2,
    Segmentation = 3,
    Clv = 4,
    Forecasting = 5,
    // Add new modules here — append only.
}
