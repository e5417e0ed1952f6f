//! Wrapping tick arithmetic.
//!
//! Alarm and epoch code works in the low 32 bits of the extended clock.
//! Comparisons are made on the signed difference so that any two
//! instants less than half an era apart compare correctly across a wrap.

/// Ticks in one pass of the 16-bit hardware counter.
pub const COUNTER_PERIOD: u32 = 1 << 16;

/// Half of the 32-bit tick era.
pub const HALF_ERA: u32 = 1 << 31;

/// Signed distance from `now` to `deadline`. Negative once `deadline` has passed.
#[inline]
pub const fn ticks_until(deadline: u32, now: u32) -> i32 {
    deadline.wrapping_sub(now) as i32
}

/// True when `t` is at or after `reference` in wrapping order.
#[inline]
pub const fn reached(t: u32, reference: u32) -> bool {
    ticks_until(reference, t) <= 0
}

/// Upper 16 bits of a 32-bit tick: the overflow epoch the instant lives in.
#[inline]
pub const fn epoch_of(t: u32) -> u16 {
    (t >> 16) as u16
}

/// Joins an overflow count and a counter value into a 48-bit tick.
#[inline]
pub const fn join_extended(overflow_count: u32, counter: u16) -> u64 {
    ((overflow_count as u64) << 16) | counter as u64
}

/// Rebuilds the 32-bit tick of a 16-bit hardware `stamp` taken no more
/// than one counter period before `now`.
#[inline]
pub const fn extend_stamp(stamp: u16, now: u32) -> u32 {
    let t = (now & 0xFFFF_0000) | stamp as u32;
    if stamp > now as u16 {
        t.wrapping_sub(COUNTER_PERIOD)
    } else {
        t
    }
}

/// Converts a duration in milliseconds to ticks at `hz`, rounding down.
#[inline]
pub const fn ms_to_ticks(ms: u32, hz: u32) -> u64 {
    (ms as u64 * hz as u64) / 1000
}

/// Converts ticks at `hz` to whole milliseconds.
#[inline]
pub const fn ticks_to_ms(ticks: u64, hz: u32) -> u64 {
    if hz == 0 {
        return 0;
    }
    ((ticks as u128 * 1000) / hz as u128) as u64
}

/// Converts ticks at `hz` to whole microseconds.
#[inline]
pub const fn ticks_to_us(ticks: u64, hz: u32) -> u64 {
    if hz == 0 {
        return 0;
    }
    ((ticks as u128 * 1_000_000) / hz as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_until_across_wrap() {
        assert_eq!(ticks_until(5, 0xFFFF_FFFE), 7);
        assert_eq!(ticks_until(0xFFFF_FFFE, 5), -7);
        assert!(reached(3, 0xFFFF_FFF0));
        assert!(!reached(0xFFFF_FFF0, 3));
    }

    #[test]
    fn test_extend_stamp_previous_epoch() {
        assert_eq!(extend_stamp(0x0100, 0x0003_0200), 0x0003_0100);
        assert_eq!(extend_stamp(0xFF00, 0x0003_0010), 0x0002_FF00);
        assert_eq!(extend_stamp(0x0010, 0x0000_0010), 0x0000_0010);
    }

    #[test]
    fn test_join_and_epoch() {
        assert_eq!(join_extended(2, 0x1234), 0x2_1234);
        assert_eq!(epoch_of(0x0005_FFFF), 5);
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(ms_to_ticks(1000, 32768), 32768);
        assert_eq!(ticks_to_ms(16384, 32768), 500);
        assert_eq!(ticks_to_us(1, 1_000_000), 1);
        assert_eq!(ticks_to_ms(10, 0), 0);
    }
}
