//! Interrupt-handler return values.
//!
//! Every callback invoked from interrupt context reports what the
//! interrupted code should do next. Results from several callbacks in one
//! interrupt are merged with `|`: the strongest wake request wins and the
//! disable request is kept if any callback raised it.

use core::ops::{BitOr, BitOrAssign};

use crate::hw::LowPower;

/// Wake request attached to an [`IsrResult`], ordered by strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wake {
    /// Return to whatever mode was interrupted.
    #[default]
    Stay,
    /// Leave low-power mode on return from interrupt.
    ExitLowPower,
    /// Leave low-power mode and let the scheduler run.
    Yield,
}

/// Result of an interrupt callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsrResult {
    wake: Wake,
    disable: bool,
}

impl IsrResult {
    /// Nothing to report.
    pub const CONTINUE: Self = Self { wake: Wake::Stay, disable: false };
    /// Wake the foreground from low-power mode.
    pub const EXIT_LOW_POWER: Self = Self { wake: Wake::ExitLowPower, disable: false };
    /// Wake the foreground and request a reschedule.
    pub const YIELD: Self = Self { wake: Wake::Yield, disable: false };

    pub const fn new(wake: Wake) -> Self {
        Self { wake, disable: false }
    }

    /// Also asks the dispatcher to unlink the callback that returned this.
    pub const fn with_disable(self) -> Self {
        Self { wake: self.wake, disable: true }
    }

    pub const fn wake(&self) -> Wake {
        self.wake
    }

    pub const fn disables(&self) -> bool {
        self.disable
    }

    pub fn exits_low_power(&self) -> bool {
        self.wake >= Wake::ExitLowPower
    }

    /// The part of the result that travels past the callback's own
    /// dispatcher. Disable requests apply only to the callback itself.
    pub const fn propagated(self) -> Self {
        Self { wake: self.wake, disable: false }
    }

    /// Applies the wake request to the interrupted context.
    pub fn apply<L: LowPower + ?Sized>(&self, lpm: &L) {
        if self.exits_low_power() {
            lpm.exit_on_return();
        }
    }
}

impl BitOr for IsrResult {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            wake: if rhs.wake > self.wake { rhs.wake } else { self.wake },
            disable: self.disable || rhs.disable,
        }
    }
}

impl BitOrAssign for IsrResult {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl From<Wake> for IsrResult {
    fn from(wake: Wake) -> Self {
        Self::new(wake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Lpm {
        exits: Cell<u32>,
    }

    impl LowPower for Lpm {
        fn exit_on_return(&self) {
            self.exits.set(self.exits.get() + 1);
        }

        fn enter(&self) {}
    }

    #[test]
    fn test_merge_keeps_strongest_wake() {
        let merged = IsrResult::EXIT_LOW_POWER | IsrResult::CONTINUE;
        assert_eq!(merged.wake(), Wake::ExitLowPower);

        let merged = IsrResult::YIELD | IsrResult::EXIT_LOW_POWER;
        assert_eq!(merged.wake(), Wake::Yield);
        assert!(!merged.disables());
    }

    #[test]
    fn test_disable_is_sticky_until_propagated() {
        let mut acc = IsrResult::CONTINUE;
        acc |= IsrResult::CONTINUE.with_disable();
        assert!(acc.disables());
        assert!(!acc.propagated().disables());
        assert_eq!(acc.propagated().wake(), Wake::Stay);
    }

    #[test]
    fn test_apply_only_wakes_when_requested() {
        let lpm = Lpm { exits: Cell::new(0) };
        IsrResult::CONTINUE.apply(&lpm);
        assert_eq!(lpm.exits.get(), 0);
        IsrResult::YIELD.apply(&lpm);
        IsrResult::EXIT_LOW_POWER.with_disable().apply(&lpm);
        assert_eq!(lpm.exits.get(), 2);
    }
}
