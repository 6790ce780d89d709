//! Mother-of-all pseudo-random generator.
//!
//! DMAMAC embeds its own generator rather than using an ecosystem RNG because
//! bit-exact reproducibility is part of the protocol contract: independent
//! nodes seeded identically must derive identical per-superframe channel
//! sequences, and a whole run must replay exactly from its seed. The
//! recurrence (George Marsaglia's "Mother of All" generator) keeps five
//! 32-bit words of state and produces one word per draw through a fixed
//! 64-bit multiply-accumulate.
//!
//! Ranged draws use a 64-bit multiply-and-shift instead of modulo reduction,
//! so the mapping onto `[min, max]` carries no modulo bias.

/// Sentinel returned by [`MotherRng::uniform_int`] when `max < min`.
pub const RANGE_ERROR: i32 = i32::MIN;

/// Deterministic five-word generator.
#[derive(Debug, Clone)]
pub struct MotherRng {
    x: [u32; 5],
    prev: [u32; 5],
}

impl MotherRng {
    /// Create a generator from a seed.
    ///
    /// The seed schedule matches the reference implementation exactly: a
    /// linear-congruential fill of the five state words followed by 19
    /// warm-up draws.
    pub fn new(seed: i32) -> Self {
        let mut rng = MotherRng {
            x: [0; 5],
            prev: [0; 5],
        };
        let mut s = seed as u32;
        for word in rng.x.iter_mut() {
            s = s.wrapping_mul(29943829).wrapping_sub(1);
            *word = s;
        }
        for _ in 0..19 {
            rng.next_word();
        }
        rng
    }

    /// Advance the recurrence and return the next 32-bit word.
    pub fn next_word(&mut self) -> u32 {
        self.prev = self.x;
        let sum = 2111111111u64 * u64::from(self.x[3])
            + 1492u64 * u64::from(self.x[2])
            + 1776u64 * u64::from(self.x[1])
            + 5115u64 * u64::from(self.x[0])
            + u64::from(self.x[4]);
        self.x[3] = self.x[2];
        self.x[2] = self.x[1];
        self.x[1] = self.x[0];
        self.x[4] = (sum >> 32) as u32; // carry
        self.x[0] = sum as u32;
        self.x[0]
    }

    /// One word of output computed from a caller-supplied state snapshot,
    /// without touching this generator's own state. Used to derive the
    /// channel a peer will hop to from its advertised sequence.
    pub fn word_from(v: &[u32; 5]) -> u32 {
        let sum = 2111111111u64 * u64::from(v[3])
            + 1492u64 * u64::from(v[2])
            + 1776u64 * u64::from(v[1])
            + 5115u64 * u64::from(v[0])
            + u64::from(v[4]);
        sum as u32
    }

    /// Uniform integer in the inclusive interval `[min, max]`.
    ///
    /// Returns `min` when `min == max` and [`RANGE_ERROR`] when `max < min`.
    pub fn uniform_int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            if max == min {
                return min;
            }
            return RANGE_ERROR;
        }
        let interval = (max - min + 1) as u32;
        let longran = u64::from(self.next_word()) * u64::from(interval);
        let iran = (longran >> 32) as u32;
        iran as i32 + min
    }

    /// Like [`uniform_int`](Self::uniform_int), drawing from a state snapshot.
    pub fn uniform_int_from(min: i32, max: i32, v: &[u32; 5]) -> i32 {
        if max <= min {
            if max == min {
                return min;
            }
            return RANGE_ERROR;
        }
        let interval = (max - min + 1) as u32;
        let longran = u64::from(Self::word_from(v)) * u64::from(interval);
        let iran = (longran >> 32) as u32;
        iran as i32 + min
    }

    /// Uniform double in `[0, 1)`.
    pub fn uniform_real01(&mut self) -> f64 {
        f64::from(self.next_word()) * (1.0 / (65536.0 * 65536.0))
    }

    /// Current state words.
    pub fn state(&self) -> [u32; 5] {
        self.x
    }

    /// State words before the most recent draw.
    pub fn prev_state(&self) -> [u32; 5] {
        self.prev
    }

    /// Overwrite the state words.
    pub fn set_state(&mut self, v: [u32; 5]) {
        self.x = v;
    }
}
