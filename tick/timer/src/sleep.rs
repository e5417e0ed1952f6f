//! Low-power sleep until a deadline.
//!
//! A [`SleepAlarm`] owns one dedicated alarm whose callback only asks the
//! interrupted context to leave low-power mode. Sleeping arms the alarm,
//! enters low power and cancels the alarm once anything wakes the CPU, so
//! any other interrupt that exits low power ends the sleep early.

use log::trace;
use tick_core::{
    ms_to_ticks, ticks_until, IsrResult, LowPower, TimerHardware, TimerResult, HALF_ERA,
};

use crate::alarm::{AlarmContext, DedicatedAlarm, ScheduleOutcome};
use crate::clock::Timer;
use crate::config::MUX_CAPACITY;

fn wake(_ctx: &mut AlarmContext<'_>) -> IsrResult {
    IsrResult::EXIT_LOW_POWER
}

/// Sleeps on a channel reserved for waking the foreground.
pub struct SleepAlarm<'t, H, const M: usize = MUX_CAPACITY> {
    alarm: DedicatedAlarm<'t, H, M>,
}

impl<'t, H: TimerHardware, const M: usize> SleepAlarm<'t, H, M> {
    /// Binds `channel` and enables its alarm.
    pub fn initialize(timer: &'t Timer<H, M>, channel: u8) -> TimerResult<Self> {
        let alarm = DedicatedAlarm::initialize(timer, channel, wake)?;
        alarm.enable()?;
        Ok(Self { alarm })
    }

    pub fn channel(&self) -> u8 {
        self.alarm.channel()
    }

    fn remaining(&self, deadline: u32) -> u32 {
        ticks_until(deadline, self.alarm.timer().now()).max(0) as u32
    }

    /// Sleeps in `lpm` until the clock reaches `deadline` or another
    /// interrupt leaves low power. Returns the ticks still to go, zero
    /// once the deadline was reached.
    ///
    /// Deadlines within the alarm margin are busy-waited and past ones
    /// return at once. Call with interrupts disabled: `enter` must enable
    /// them together with low power, or the wake-up can be lost.
    pub fn sleep_until<L: LowPower + ?Sized>(&self, deadline: u32, lpm: &L) -> TimerResult<u32> {
        match self.alarm.schedule(deadline)? {
            ScheduleOutcome::Armed => {
                lpm.enter();
                self.alarm.cancel()?;
            }
            ScheduleOutcome::TooSoon => {
                let timer = self.alarm.timer();
                nb::block!(timer.poll_deadline(deadline)).unwrap_or_else(|never| match never {});
            }
            ScheduleOutcome::Past => {}
        }
        let remaining = self.remaining(deadline);
        trace!("sleep on {}: {remaining} ticks left", self.channel());
        Ok(remaining)
    }

    /// Sleeps for `ticks`, going back to sleep after early wake-ups until
    /// the time is up or `wake_early` returns true. `wake_early` is checked
    /// before every sleep. Returns the ticks left when it gave up.
    pub fn sleep_for<L, P>(&self, ticks: u32, lpm: &L, mut wake_early: P) -> TimerResult<u32>
    where
        L: LowPower + ?Sized,
        P: FnMut() -> bool,
    {
        let deadline = self.alarm.timer().now().wrapping_add(ticks);
        let mut remaining = ticks;
        while remaining > 0 && !wake_early() {
            remaining = self.sleep_until(deadline, lpm)?;
        }
        Ok(remaining)
    }

    /// [`sleep_for`](Self::sleep_for) with the delay given in milliseconds
    /// of a timer running at `hz`.
    pub fn sleep_ms<L, P>(&self, ms: u32, hz: u32, lpm: &L, wake_early: P) -> TimerResult<u32>
    where
        L: LowPower + ?Sized,
        P: FnMut() -> bool,
    {
        let ticks = ms_to_ticks(ms, hz).min(u64::from(HALF_ERA - 1)) as u32;
        self.sleep_for(ticks, lpm, wake_early)
    }

    /// Disables the alarm and frees its channel.
    pub fn release(self) -> TimerResult<()> {
        self.alarm.release()
    }
}
