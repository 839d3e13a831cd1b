use serde::{Deserialize, Serialize};

/// Tiny deterministic RNG driving the simulator.
///
/// A xorshift core with a multiplicative output scramble. Not suitable for
/// anything but scheduling decisions; what matters here is that the same
/// seed replays the same campaign on every platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

/// Seed offset keeping the xorshift state nonzero (fractional bits of
/// sqrt(2)).
const SEED_OFFSET: u64 = 0x6A09_E667_F3BC_C909;

impl DeterministicRng {
    /// Create a new deterministic RNG from a seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        let state = seed.wrapping_add(SEED_OFFSET);
        Self {
            state: if state == 0 { SEED_OFFSET } else { state },
        }
    }

    /// Next pseudo-random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Next value in `[0, upper_exclusive)`.
    pub fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        self.next_u64() % upper_exclusive
    }

    /// Bernoulli trial with integer percent.
    pub fn chance(&mut self, percent: u8) -> bool {
        if percent == 0 {
            return false;
        }
        if percent >= 100 {
            return true;
        }
        self.next_bounded(100) < u64::from(percent)
    }

    /// Uniformly pick one element, or `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.next_bounded(items.len() as u64);
        items.get(usize::try_from(index).unwrap_or(0))
    }
}
