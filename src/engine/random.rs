//! Thread-local xorshift64* pseudo-random numbers.
//!
//! A lock-free source of cheap randomness for simulation setup paths
//! (sampling initial velocities, scattering spawn positions) and for
//! benchmarks. Each thread owns an independent state in a `Cell`, seeded
//! with a fixed non-zero constant, so sequences are deterministic per
//! thread.
//!
//! Not cryptographically secure; never use it for security-sensitive
//! randomness.

use std::cell::Cell;

const SEED: u64 = 0x9E37_79B9_7F4A_7C15;

thread_local! {
    static STATE: Cell<u64> = const { Cell::new(SEED) };
}

/// Next pseudo-random `u64` from the calling thread's generator.
pub fn next_u64() -> u64 {
    STATE.with(|state| {
        let mut x = state.get();
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        state.set(x);
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    })
}

/// Uniform `f32` in `[low, high)`.
pub fn uniform_f32(low: f32, high: f32) -> f32 {
    let unit = (next_u64() >> 40) as f32 / (1u64 << 24) as f32;
    low + unit * (high - low)
}
