//! Busy-wait delays on the extended clock.

use embedded_hal::delay::DelayNs;
use tick_core::{TimerError, TimerHardware, TimerResult};

use crate::clock::Timer;
use crate::config::MUX_CAPACITY;

/// [`DelayNs`] provider polling a [`Timer`] running at a known frequency.
///
/// The timer's overflow interrupt must be serviced during long delays;
/// otherwise the clock stalls after half a counter period.
pub struct TickDelay<'t, H, const M: usize = MUX_CAPACITY> {
    timer: &'t Timer<H, M>,
    hz: u32,
}

impl<'t, H: TimerHardware, const M: usize> TickDelay<'t, H, M> {
    pub fn new(timer: &'t Timer<H, M>, hz: u32) -> TimerResult<Self> {
        if hz == 0 {
            return Err(TimerError::InvalidConfiguration);
        }
        Ok(Self { timer, hz })
    }

    pub fn frequency_hz(&self) -> u32 {
        self.hz
    }

    /// Ticks covering `amount` units of `1/scale` seconds, rounded up.
    fn ticks_for(&self, amount: u32, scale: u64) -> u64 {
        (amount as u64 * self.hz as u64).div_ceil(scale)
    }

    pub fn delay_ticks(&mut self, ticks: u64) {
        let target = self.timer.now_extended() + ticks;
        nb::block!(self.timer.poll_extended(target)).unwrap_or_else(|never| match never {});
    }
}

impl<H: TimerHardware, const M: usize> DelayNs for TickDelay<'_, H, M> {
    fn delay_ns(&mut self, ns: u32) {
        let ticks = self.ticks_for(ns, 1_000_000_000);
        self.delay_ticks(ticks);
    }

    fn delay_us(&mut self, us: u32) {
        let ticks = self.ticks_for(us, 1_000_000);
        self.delay_ticks(ticks);
    }

    fn delay_ms(&mut self, ms: u32) {
        let ticks = self.ticks_for(ms, 1_000);
        self.delay_ticks(ticks);
    }
}
