//! Jitter helpers for retry waits.

use std::time::Duration;

use rand::Rng;

/// Draws a wait uniformly from `[0, max]`.
pub fn randomize<R: Rng + ?Sized>(rng: &mut R, max: Duration) -> Duration {
    let max_nanos = saturating_nanos(max);
    if max_nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rng.gen_range(0..=max_nanos))
}

/// Perturbs `wait` by a uniform offset in `[-variance, +variance]`, then
/// clamps the result into `[floor, ceiling]`.
///
/// The result is never negative and never exceeds `ceiling`.
pub fn vary<R: Rng + ?Sized>(
    rng: &mut R,
    wait: Duration,
    variance: Duration,
    floor: Duration,
    ceiling: Duration,
) -> Duration {
    let spread = saturating_nanos(variance) as i128;
    let offset = if spread == 0 {
        0
    } else {
        rng.gen_range(-spread..=spread)
    };
    let varied = (saturating_nanos(wait) as i128 + offset).max(0);
    let varied = Duration::from_nanos(varied.min(u64::MAX as i128) as u64);
    clamp(varied, floor, ceiling)
}

/// Clamps `wait` into `[floor, ceiling]`. `ceiling` wins when the bounds cross.
pub fn clamp(wait: Duration, floor: Duration, ceiling: Duration) -> Duration {
    wait.max(floor).min(ceiling)
}

fn saturating_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}
