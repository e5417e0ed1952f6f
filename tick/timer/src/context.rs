//! Timer access from interrupt callbacks.
//!
//! Callbacks run while the timer's channel arena is borrowed by the
//! interrupt handler, so the public handles ([`DedicatedAlarm`],
//! [`MuxAlarmScheduler`], ...) report [`TimerError::Busy`] when used from
//! inside one. Every callback context instead dereferences to an
//! [`IsrTimer`] that works on the arena the handler already holds.
//!
//! [`DedicatedAlarm`]: crate::DedicatedAlarm
//! [`MuxAlarmScheduler`]: crate::MuxAlarmScheduler
//! [`TimerError::Busy`]: tick_core::TimerError::Busy

use tick_core::TimerResult;

use crate::alarm::ScheduleOutcome;
use crate::mux::{MuxAlarm, MuxAlarmId};
use crate::pulse::CaptureSlot;

/// Arena operations reachable from interrupt context, independent of the
/// timer's multiplexer capacity.
pub(crate) trait IsrCore {
    fn now_extended(&self) -> u64;
    fn overflow_count(&self) -> u32;
    fn schedule_dedicated(
        &mut self,
        channel: u8,
        deadline: u32,
        force: bool,
    ) -> TimerResult<ScheduleOutcome>;
    fn cancel_dedicated(&mut self, channel: u8) -> TimerResult<bool>;
    fn add_mux(&mut self, channel: u8, alarm: MuxAlarm) -> TimerResult<MuxAlarmId>;
    fn remove_mux(&mut self, channel: u8, id: MuxAlarmId) -> TimerResult<MuxAlarm>;
    fn capture(&self, channel: u8) -> TimerResult<&CaptureSlot>;
    fn capture_mut(&mut self, channel: u8) -> TimerResult<&mut CaptureSlot>;
}

/// The timer as seen from a callback.
///
/// Alarms on any channel can be scheduled or cancelled as long as they
/// are enabled; enabling, disabling and releasing stay with the
/// foreground.
pub struct IsrTimer<'c> {
    pub(crate) core: &'c mut dyn IsrCore,
}

impl IsrTimer<'_> {
    /// Low 32 bits of the extended clock.
    pub fn now(&self) -> u32 {
        self.core.now_extended() as u32
    }

    pub fn now_extended(&self) -> u64 {
        self.core.now_extended()
    }

    pub fn overflow_count(&self) -> u32 {
        self.core.overflow_count()
    }

    /// Schedules the dedicated alarm bound to `channel`.
    pub fn schedule_alarm(&mut self, channel: u8, deadline: u32) -> TimerResult<ScheduleOutcome> {
        self.core.schedule_dedicated(channel, deadline, false)
    }

    /// Schedules the dedicated alarm bound to `channel`, firing it at once
    /// if `deadline` is past or too soon.
    pub fn schedule_alarm_forced(
        &mut self,
        channel: u8,
        deadline: u32,
    ) -> TimerResult<ScheduleOutcome> {
        self.core.schedule_dedicated(channel, deadline, true)
    }

    /// Returns true if the alarm on `channel` had a pending deadline.
    pub fn cancel_alarm(&mut self, channel: u8) -> TimerResult<bool> {
        self.core.cancel_dedicated(channel)
    }

    /// Adds an entry to the multiplexed scheduler on `channel`.
    pub fn add_mux(&mut self, channel: u8, alarm: MuxAlarm) -> TimerResult<MuxAlarmId> {
        self.core.add_mux(channel, alarm)
    }

    pub fn remove_mux(&mut self, channel: u8, id: MuxAlarmId) -> TimerResult<MuxAlarm> {
        self.core.remove_mux(channel, id)
    }
}
