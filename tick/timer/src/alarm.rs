//! Dedicated alarms: one deadline per capture/compare channel.
//!
//! An alarm moves between three states:
//!
//! ```text
//! Disabled --enable--> Enabled --schedule--> Scheduled
//!     ^                 |  ^                    |
//!     +-----disable-----+  +--fire / cancel-----+
//! ```
//!
//! The compare register only holds the low 16 bits of a deadline, so the
//! compare interrupt is enabled only while the overflow count matches the
//! deadline's upper 16 bits. Deadlines in a later epoch are armed by the
//! overflow handler when that epoch begins.

use core::ops::{Deref, DerefMut};

use log::{debug, trace};
use tick_core::{
    epoch_of, ticks_until, CaptureInput, CaptureMode, IsrResult, TimerError, TimerHardware,
    TimerResult,
};

use crate::clock::{Timer, TimerCore};
use crate::context::IsrTimer;
use crate::config::MUX_CAPACITY;
use crate::slot::{AlarmKind, AlarmSlot, ChannelSlot};

/// Callback invoked from interrupt context when a dedicated alarm fires.
pub type AlarmCallback = fn(&mut AlarmContext<'_>) -> IsrResult;

/// Lifecycle state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmState {
    Disabled,
    Enabled,
    Scheduled,
}

/// How a deadline related to the clock when it was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleOutcome {
    /// Armed normally
    Armed,
    /// Closer than the configured margin
    TooSoon,
    /// Already in the past
    Past,
}

/// Access granted to an alarm callback: the firing alarm can reschedule
/// itself, and the [`IsrTimer`] it dereferences to reaches every other
/// channel.
pub struct AlarmContext<'c> {
    timer: IsrTimer<'c>,
    channel: u8,
    deadline: u32,
}

impl AlarmContext<'_> {
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Deadline that just fired.
    pub fn deadline(&self) -> u32 {
        self.deadline
    }

    pub fn schedule(&mut self, deadline: u32) -> TimerResult<ScheduleOutcome> {
        self.timer.schedule_alarm(self.channel, deadline)
    }

    pub fn schedule_forced(&mut self, deadline: u32) -> TimerResult<ScheduleOutcome> {
        self.timer.schedule_alarm_forced(self.channel, deadline)
    }
}

impl<'c> Deref for AlarmContext<'c> {
    type Target = IsrTimer<'c>;

    fn deref(&self) -> &Self::Target {
        &self.timer
    }
}

impl DerefMut for AlarmContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.timer
    }
}

fn arm_compare(hw: &dyn TimerHardware, channel: u8, deadline: u32) {
    hw.set_compare(channel, deadline as u16);
    hw.clear_channel_flag(channel);
    hw.set_channel_interrupt(channel, true);
}

fn disarm_compare(hw: &dyn TimerHardware, channel: u8) {
    hw.set_channel_interrupt(channel, false);
    hw.clear_channel_flag(channel);
}

impl<const M: usize> TimerCore<'_, M> {
    pub(crate) fn alarm_mut(&mut self, channel: u8) -> TimerResult<&mut AlarmSlot<M>> {
        match self.st.channels.get_mut(channel as usize) {
            Some(ChannelSlot::Alarm(alarm)) => Ok(alarm),
            Some(_) => Err(TimerError::WrongChannelKind),
            None => Err(TimerError::InvalidChannel),
        }
    }

    pub(crate) fn alarm_enable(&mut self, channel: u8) -> TimerResult<()> {
        let hw = self.hw;
        let alarm = self.alarm_mut(channel)?;
        if alarm.state == AlarmState::Disabled {
            hw.configure_capture(channel, CaptureMode::Compare, CaptureInput::A);
            disarm_compare(hw, channel);
            alarm.state = AlarmState::Enabled;
        }
        Ok(())
    }

    pub(crate) fn alarm_disable(&mut self, channel: u8) -> TimerResult<()> {
        self.alarm_cancel(channel)?;
        self.alarm_mut(channel)?.state = AlarmState::Disabled;
        Ok(())
    }

    pub(crate) fn alarm_schedule(
        &mut self,
        channel: u8,
        deadline: u32,
        force: bool,
    ) -> TimerResult<ScheduleOutcome> {
        let hw = self.hw;
        let margin = self.config.alarm_margin;
        let now = self.now();

        let alarm = self.alarm_mut(channel)?;
        match alarm.state {
            AlarmState::Disabled => return Err(TimerError::NotEnabled),
            AlarmState::Scheduled => return Err(TimerError::AlreadyScheduled),
            AlarmState::Enabled => {}
        }

        let delay = ticks_until(deadline, now);
        let outcome = if delay < 0 {
            ScheduleOutcome::Past
        } else if (delay as u32) < margin {
            ScheduleOutcome::TooSoon
        } else {
            ScheduleOutcome::Armed
        };
        if outcome != ScheduleOutcome::Armed && !force {
            trace!("alarm {channel}: {outcome:?} for {deadline:#010x} at {now:#010x}");
            return Ok(outcome);
        }

        alarm.state = AlarmState::Scheduled;
        alarm.deadline = deadline;
        alarm.awaiting_epoch = false;

        if outcome != ScheduleOutcome::Armed {
            arm_compare(hw, channel, deadline);
            hw.set_channel_flag(channel);
        } else if epoch_of(deadline) == epoch_of(now) {
            arm_compare(hw, channel, deadline);
            if ticks_until(deadline, self.now()) <= 0 {
                hw.set_channel_flag(channel);
            }
        } else {
            alarm.awaiting_epoch = true;
            hw.set_compare(channel, deadline as u16);
            disarm_compare(hw, channel);
        }
        Ok(outcome)
    }

    /// Returns true if a pending deadline was cancelled.
    pub(crate) fn alarm_cancel(&mut self, channel: u8) -> TimerResult<bool> {
        let hw = self.hw;
        let alarm = self.alarm_mut(channel)?;
        if alarm.state != AlarmState::Scheduled {
            return Ok(false);
        }
        alarm.state = AlarmState::Enabled;
        alarm.awaiting_epoch = false;
        disarm_compare(hw, channel);
        Ok(true)
    }

    /// Arms alarms whose deadline epoch has just begun.
    pub(crate) fn arm_epoch_alarms(&mut self) {
        let epoch = self.overflow_count() as u16;
        for idx in 0..self.st.channels.len() {
            let deadline = match &mut self.st.channels[idx] {
                ChannelSlot::Alarm(alarm)
                    if alarm.state == AlarmState::Scheduled
                        && alarm.awaiting_epoch
                        && epoch_of(alarm.deadline) == epoch =>
                {
                    alarm.awaiting_epoch = false;
                    alarm.deadline
                }
                _ => continue,
            };
            let channel = idx as u8;
            arm_compare(self.hw, channel, deadline);
            // Interrupt latency may have carried the counter past the match.
            if self.read_counter() >= deadline as u16 {
                self.hw.set_channel_flag(channel);
            }
        }
    }

    pub(crate) fn on_alarm_compare(&mut self, channel: u8) -> IsrResult {
        let hw = self.hw;
        let Ok(alarm) = self.alarm_mut(channel) else {
            hw.set_channel_interrupt(channel, false);
            return IsrResult::CONTINUE;
        };
        if alarm.state != AlarmState::Scheduled || alarm.awaiting_epoch {
            trace!("alarm {channel}: stale compare");
            hw.set_channel_interrupt(channel, false);
            return IsrResult::CONTINUE;
        }
        alarm.state = AlarmState::Enabled;
        hw.set_channel_interrupt(channel, false);

        let deadline = alarm.deadline;
        let callback = match &alarm.kind {
            AlarmKind::Callback(cb) => Some(*cb),
            AlarmKind::Multiplexed(_) => None,
        };
        match callback {
            Some(cb) => {
                let mut ctx = AlarmContext {
                    timer: IsrTimer { core: &mut *self },
                    channel,
                    deadline,
                };
                cb(&mut ctx).propagated()
            }
            None => self.mux_dispatch(channel),
        }
    }
}

/// An alarm bound to one capture/compare channel of a [`Timer`].
pub struct DedicatedAlarm<'t, H, const M: usize = MUX_CAPACITY> {
    timer: &'t Timer<H, M>,
    channel: u8,
}

impl<'t, H: TimerHardware, const M: usize> DedicatedAlarm<'t, H, M> {
    /// Binds `channel` to a new alarm in the disabled state.
    pub fn initialize(
        timer: &'t Timer<H, M>,
        channel: u8,
        callback: AlarmCallback,
    ) -> TimerResult<Self> {
        timer.with_core(|core| {
            core.claim(
                channel,
                ChannelSlot::Alarm(AlarmSlot::new(AlarmKind::Callback(callback))),
            )
        })?;
        debug!("alarm bound to channel {channel}");
        Ok(Self { timer, channel })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn timer(&self) -> &'t Timer<H, M> {
        self.timer
    }

    pub fn state(&self) -> TimerResult<AlarmState> {
        self.timer
            .with_core(|core| core.alarm_mut(self.channel).map(|a| a.state))
    }

    /// Pending deadline, if scheduled.
    pub fn deadline(&self) -> TimerResult<Option<u32>> {
        self.timer.with_core(|core| {
            let alarm = core.alarm_mut(self.channel)?;
            Ok((alarm.state == AlarmState::Scheduled).then_some(alarm.deadline))
        })
    }

    pub fn set_enabled(&self, enabled: bool) -> TimerResult<()> {
        if enabled {
            self.enable()
        } else {
            self.disable()
        }
    }

    pub fn enable(&self) -> TimerResult<()> {
        self.timer.with_core(|core| core.alarm_enable(self.channel))
    }

    /// Cancels any pending deadline and disables the alarm.
    pub fn disable(&self) -> TimerResult<()> {
        self.timer.with_core(|core| core.alarm_disable(self.channel))
    }

    /// Schedules `deadline`. Deadlines in the past or within the margin
    /// are reported and left unarmed.
    pub fn schedule(&self, deadline: u32) -> TimerResult<ScheduleOutcome> {
        self.timer
            .with_core(|core| core.alarm_schedule(self.channel, deadline, false))
    }

    /// Schedules `deadline`, firing immediately if it is past or too soon.
    pub fn schedule_forced(&self, deadline: u32) -> TimerResult<ScheduleOutcome> {
        self.timer
            .with_core(|core| core.alarm_schedule(self.channel, deadline, true))
    }

    /// Schedules a deadline `delay` ticks from now.
    pub fn schedule_in(&self, delay: u32) -> TimerResult<ScheduleOutcome> {
        self.timer.with_core(|core| {
            let deadline = core.now().wrapping_add(delay);
            core.alarm_schedule(self.channel, deadline, false)
        })
    }

    /// Returns true if a pending deadline was cancelled.
    pub fn cancel(&self) -> TimerResult<bool> {
        self.timer.with_core(|core| core.alarm_cancel(self.channel))
    }

    /// Disables the alarm and frees its channel.
    pub fn release(self) -> TimerResult<()> {
        self.timer.with_core(|core| {
            core.alarm_disable(self.channel)?;
            core.release(self.channel)
        })
    }
}
