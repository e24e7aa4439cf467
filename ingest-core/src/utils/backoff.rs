use std::time::Duration;

/// Largest exponent applied before the cap takes over regardless of `base`.
const MAX_EXPONENT: u32 = 31;

/// Returns `base * 2^exponent`, saturating, capped at `cap`.
pub fn exponential_delay(base: Duration, cap: Duration, exponent: u32) -> Duration {
    let factor = 2u32.saturating_pow(exponent.min(MAX_EXPONENT));
    base.saturating_mul(factor).min(cap)
}
