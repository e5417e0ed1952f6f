use std::cell::Cell;

use tick_core::{ClockSource, ClockTree, IsrResult, LowPower};

use crate::SimTimer;

/// Fixed clock tree for simulation.
#[derive(Debug, Clone, Copy)]
pub struct SimClocks {
    pub core_hz: u32,
    pub auxiliary_hz: u32,
    pub submain_hz: u32,
    pub external_hz: Option<u32>,
}

impl Default for SimClocks {
    fn default() -> Self {
        Self {
            core_hz: 8_000_000,
            auxiliary_hz: 32_768,
            submain_hz: 8_000_000,
            external_hz: None,
        }
    }
}

impl ClockTree for SimClocks {
    fn core_hz(&self) -> u32 {
        self.core_hz
    }

    fn source_hz(&self, source: ClockSource) -> Option<u32> {
        match source {
            ClockSource::Auxiliary => Some(self.auxiliary_hz),
            ClockSource::SubMain => Some(self.submain_hz),
            ClockSource::External | ClockSource::InvertedExternal => self.external_hz,
        }
    }

    fn is_core_synchronous(&self, source: ClockSource) -> bool {
        source == ClockSource::SubMain
    }
}

/// Records low-power requests instead of sleeping.
#[derive(Debug, Default)]
pub struct SimLowPower {
    exits: Cell<u32>,
    entries: Cell<u32>,
}

impl SimLowPower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of exit-on-return requests seen.
    pub fn exits(&self) -> u32 {
        self.exits.get()
    }

    pub fn entries(&self) -> u32 {
        self.entries.get()
    }
}

impl LowPower for SimLowPower {
    fn exit_on_return(&self) {
        self.exits.set(self.exits.get() + 1);
    }

    fn enter(&self) {
        self.entries.set(self.entries.get() + 1);
    }
}

/// Low-power mode that runs the simulated timer while "asleep".
///
/// `enter` steps `sim` and services interrupts through `isr` until one of
/// them asks to leave low power, or until `limit` ticks have passed.
pub struct SimSleep<'s, F> {
    sim: &'s SimTimer,
    isr: F,
    limit: u32,
    entries: Cell<u32>,
    slept: Cell<u32>,
}

impl<'s, F: Fn() -> IsrResult> SimSleep<'s, F> {
    pub fn new(sim: &'s SimTimer, limit: u32, isr: F) -> Self {
        Self {
            sim,
            isr,
            limit,
            entries: Cell::new(0),
            slept: Cell::new(0),
        }
    }

    pub fn entries(&self) -> u32 {
        self.entries.get()
    }

    /// Ticks spent in low power over all entries.
    pub fn slept(&self) -> u32 {
        self.slept.get()
    }
}

impl<F: Fn() -> IsrResult> LowPower for SimSleep<'_, F> {
    fn exit_on_return(&self) {}

    fn enter(&self) {
        self.entries.set(self.entries.get() + 1);
        let ticks =
            crate::run_until_wake(self.sim, self.limit, || (self.isr)()).unwrap_or(self.limit);
        self.slept.set(self.slept.get() + ticks);
    }
}
