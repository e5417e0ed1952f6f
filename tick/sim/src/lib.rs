//! Host simulation port for the tick timer HAL
//!
//! Provides a cycle-stepped model of a 16-bit timer peripheral so the
//! timer services can be exercised on the build host. The crate also
//! enables the `std` critical-section implementation for host binaries.

mod clocks;
mod timer;

pub use clocks::{SimClocks, SimLowPower, SimSleep};
pub use timer::SimTimer;

pub use critical_section;

use tick_core::IsrResult;

/// Advances `sim` one tick at a time, invoking `isr` whenever an enabled
/// interrupt is pending. Returns the merged result of every `isr` call.
pub fn run<F>(sim: &SimTimer, ticks: u32, mut isr: F) -> IsrResult
where
    F: FnMut() -> IsrResult,
{
    let mut result = IsrResult::CONTINUE;
    for _ in 0..ticks {
        sim.tick();
        if sim.interrupt_pending() {
            result |= isr();
        }
    }
    result
}

/// Like [`run`] but stops after the first tick whose interrupt handling
/// requests a wake-up. Returns the number of ticks consumed.
pub fn run_until_wake<F>(sim: &SimTimer, limit: u32, mut isr: F) -> Option<u32>
where
    F: FnMut() -> IsrResult,
{
    for n in 1..=limit {
        sim.tick();
        if sim.interrupt_pending() && isr().exits_low_power() {
            return Some(n);
        }
    }
    None
}
