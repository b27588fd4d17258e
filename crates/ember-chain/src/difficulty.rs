//! # ASERT Difficulty
//!
//! Absolutely scheduled exponentially rising targets: every block
//! retargets against a fixed anchor using the schedule drift, so the
//! ideal block cadence is recovered exponentially with the configured
//! half life.
//!
//! The target is a ceiling: a higher number means easier blocks. When the
//! chain runs ahead of schedule the target shrinks, when it falls behind
//! the target grows.
//!
//! The fractional power of two is interpolated with the cubic
//! approximation standard for this rule, over 16 fractional bits; the
//! result is deterministic across platforms because everything is integer
//! arithmetic.

use shared_types::U256;

/// Radix of the fixed-point exponent.
const RADIX_BITS: u32 = 16;

/// Compute the target for the block at `next_height`.
///
/// `anchor_*` describe the anchor block configured in the network params;
/// `parent_timestamp` is the timestamp of the new block's parent. The
/// result is clamped to `[min_target, U256::MAX]`.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn asert_next_target(
    anchor_target: U256,
    anchor_timestamp: u64,
    anchor_height: u64,
    parent_timestamp: u64,
    next_height: u64,
    target_block_ms: u64,
    half_life_blocks: u64,
    min_target: U256,
) -> U256 {
    debug_assert!(next_height > anchor_height);
    let half_life_ms = half_life_blocks.max(1).saturating_mul(target_block_ms.max(1));

    // Drift of the parent's arrival against the anchor schedule. The
    // ideal span counts the new block, matching the anchor convention
    // where the anchor block itself is on schedule.
    let actual_ms = i128::from(parent_timestamp) - i128::from(anchor_timestamp);
    let blocks_since_anchor = i128::from(next_height - anchor_height);
    let ideal_ms = blocks_since_anchor * i128::from(target_block_ms);

    let exponent = ((actual_ms - ideal_ms) << RADIX_BITS) / i128::from(half_life_ms);
    let shifts = exponent >> RADIX_BITS;
    let frac = (exponent - (shifts << RADIX_BITS)) as u128;
    debug_assert!(frac < (1 << RADIX_BITS));

    // factor = 2^(frac/2^16) in 16.16 fixed point, cubic approximation.
    let factor: u128 = (1 << RADIX_BITS)
        + ((195_766_423_245_049u128 * frac
            + 971_821_376u128 * frac * frac
            + 5_127u128 * frac * frac * frac
            + (1u128 << 47))
            >> 48);

    let scaled = mul_factor(anchor_target, factor);
    let target = apply_shifts(scaled, shifts);

    if target < min_target {
        min_target
    } else {
        target
    }
}

/// Work contributed by a block with the given target, for cumulative
/// difficulty. Lower targets contribute more work.
#[must_use]
pub fn work_from_target(target: U256) -> U256 {
    match target.checked_add(U256::one()) {
        Some(divisor) => (U256::MAX / divisor).saturating_add(U256::one()),
        // Easiest possible target still counts one unit.
        None => U256::one(),
    }
}

/// `target * factor / 2^16`, saturating at the maximum target.
fn mul_factor(target: U256, factor: u128) -> U256 {
    let factor = U256::from(factor);
    match target.checked_mul(factor) {
        Some(product) => product >> RADIX_BITS,
        None => {
            // Divide first; the precision loss only matters at targets
            // that are already astronomically easy.
            (target >> RADIX_BITS).saturating_mul(factor)
        }
    }
}

fn apply_shifts(target: U256, shifts: i128) -> U256 {
    if shifts == 0 {
        return target;
    }
    if shifts > 0 {
        let s = shifts.min(255) as usize;
        if target >> (256 - s) != U256::zero() {
            return U256::MAX;
        }
        target << s
    } else {
        let s = (-shifts).min(255) as usize;
        target >> s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 10_000;
    const HALF_LIFE: u64 = 144;

    fn target() -> U256 {
        U256::from(1u64) << 200
    }

    fn next(parent_ts_offset: u64, height: u64) -> U256 {
        asert_next_target(
            target(),
            1_000_000,
            0,
            1_000_000 + parent_ts_offset,
            height,
            T,
            HALF_LIFE,
            U256::one(),
        )
    }

    #[test]
    fn test_on_schedule_keeps_target() {
        // Zero drift: the parent landed exactly where the schedule puts
        // the ideal span for the new height.
        let got = next(10 * T, 10);
        assert_eq!(got, target());
    }

    #[test]
    fn test_slow_blocks_raise_target() {
        // Chain is behind schedule; blocks must get easier.
        let got = next(20 * T, 10);
        assert!(got > target());
    }

    #[test]
    fn test_fast_blocks_lower_target() {
        let got = next(2 * T, 10);
        assert!(got < target());
    }

    #[test]
    fn test_half_life_doubles_target() {
        // One full half life behind schedule doubles the target.
        let got = next(10 * T + HALF_LIFE * T, 10);
        assert_eq!(got, target() << 1);
    }

    #[test]
    fn test_half_life_halves_target() {
        // Drift is -T with a half life of one block, exactly one halving.
        let got = asert_next_target(
            target(),
            1_000_000,
            0,
            1_000_000,
            1,
            T,
            1,
            U256::one(),
        );
        assert_eq!(got, target() >> 1);
    }

    #[test]
    fn test_clamped_to_min_target() {
        let got = asert_next_target(
            U256::from(1024u64),
            1_000_000,
            0,
            1_000_000,
            100, // far ahead of schedule
            T,
            1,
            U256::from(512u64),
        );
        assert_eq!(got, U256::from(512u64));
    }

    #[test]
    fn test_saturates_at_max() {
        let got = asert_next_target(
            U256::MAX >> 1,
            1_000_000,
            0,
            1_000_000 + 10_000 * T, // far behind schedule
            2,
            T,
            1,
            U256::one(),
        );
        assert_eq!(got, U256::MAX);
    }

    #[test]
    fn test_work_inversely_tracks_target() {
        let easy = work_from_target(U256::MAX >> 1);
        let hard = work_from_target(U256::from(1u64) << 200);
        assert!(hard > easy);
        assert!(work_from_target(U256::MAX) >= U256::one());
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(next(13 * T + 37, 10), next(13 * T + 37, 10));
    }
}
