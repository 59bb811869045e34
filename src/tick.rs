// Wrapping tick arithmetic and the injected time source.
//
// Ticks are unsigned and wrap modulo 2^32. Every ordering decision in
// the crate goes through signed-difference comparison, which stays
// correct across wraparound as long as no single interval exceeds half
// the tick range.

/// One unit of the injected monotonic time source (typically 1 ms).
pub type Tick = u32;

/// Zero-argument monotonic tick source. Wrapping is expected.
pub type TimingFn = fn() -> Tick;

// `a` earlier than `b` in wrapping tick order
#[inline]
pub(crate) fn tick_before(a: Tick, b: Tick) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[cfg(any(test, feature = "std"))]
mod host {
    use super::Tick;
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();

    /// Milliseconds since the first call, from the host monotonic clock.
    ///
    /// The host-side stand-in for a platform millisecond counter; wraps
    /// after ~49.7 days like the real thing.
    pub fn host_millis() -> Tick {
        EPOCH.get_or_init(Instant::now).elapsed().as_millis() as Tick
    }
}

#[cfg(any(test, feature = "std"))]
pub use host::host_millis;
