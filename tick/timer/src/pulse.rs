//! Pulse-width capture on one channel.
//!
//! The channel captures both edges. The first edge records the start time
//! and the pulse polarity, the second records the end time. Any further
//! edge, or a hardware capture overrun, marks the measurement as
//! overflowed and invalidates both timestamps until the caller clears it.

use core::ops::{Deref, DerefMut};

use bitflags::bitflags;
use log::{debug, trace};
use tick_core::{
    extend_stamp, CaptureInput, CaptureMode, IsrResult, TimerError, TimerHardware, TimerResult,
};

use crate::clock::{Timer, TimerCore};
use crate::config::MUX_CAPACITY;
use crate::context::IsrTimer;
use crate::slot::ChannelSlot;

bitflags! {
    /// Capture state and notification flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PulseFlags: u16 {
        const START_VALID = 1 << 0;
        const END_VALID = 1 << 1;
        /// More edges than a single pulse, or a hardware overrun.
        const OVERFLOW = 1 << 2;
        /// Pulse started on a rising edge.
        const ACTIVE_HIGH = 1 << 3;
        const ENABLED = 1 << 4;
        const ACTIVE = 1 << 5;
        /// Invoke the callback when the start edge is captured.
        const START_CALLBACK = 1 << 6;
        /// Invoke the callback when the end edge is captured.
        const END_CALLBACK = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PulseFlags {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "PulseFlags({=u16:#x})", self.bits());
    }
}

const NOTIFY: PulseFlags = PulseFlags::START_CALLBACK.union(PulseFlags::END_CALLBACK);
const VALID: PulseFlags = PulseFlags::START_VALID.union(PulseFlags::END_VALID);

/// Callback invoked from the capture interrupt.
pub type PulseCallback = fn(&mut PulseContext<'_>) -> IsrResult;

pub(crate) struct CaptureSlot {
    flags: PulseFlags,
    start: u32,
    end: u32,
    input: CaptureInput,
    callback: Option<PulseCallback>,
}

impl CaptureSlot {
    pub(crate) fn clear(&mut self) {
        self.flags.remove(VALID | PulseFlags::OVERFLOW);
    }

    pub(crate) fn snapshot(&self) -> PulseSnapshot {
        PulseSnapshot {
            flags: self.flags,
            start: self.start,
            end: self.end,
        }
    }
}

/// Copy of a capture's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseSnapshot {
    pub flags: PulseFlags,
    pub start: u32,
    pub end: u32,
}

impl PulseSnapshot {
    /// Width in ticks of a completely captured pulse.
    pub fn width(&self) -> Option<u32> {
        self.flags
            .contains(VALID)
            .then(|| self.end.wrapping_sub(self.start))
    }

    pub fn is_active_high(&self) -> bool {
        self.flags.contains(PulseFlags::ACTIVE_HIGH)
    }

    pub fn overflowed(&self) -> bool {
        self.flags.contains(PulseFlags::OVERFLOW)
    }
}

/// State visible to a pulse callback. Alarms, such as a timeout armed
/// from the start edge, are reached through the [`IsrTimer`].
pub struct PulseContext<'c> {
    timer: IsrTimer<'c>,
    channel: u8,
}

impl PulseContext<'_> {
    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn snapshot(&self) -> PulseSnapshot {
        self.timer
            .core
            .capture(self.channel)
            .map_or(PulseSnapshot::default(), CaptureSlot::snapshot)
    }

    /// Discards the recorded timestamps and any overflow.
    pub fn clear(&mut self) {
        if let Ok(slot) = self.timer.core.capture_mut(self.channel) {
            slot.clear();
        }
    }
}

impl<'c> Deref for PulseContext<'c> {
    type Target = IsrTimer<'c>;

    fn deref(&self) -> &Self::Target {
        &self.timer
    }
}

impl DerefMut for PulseContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.timer
    }
}

impl<const M: usize> TimerCore<'_, M> {
    pub(crate) fn capture_ref(&self, channel: u8) -> TimerResult<&CaptureSlot> {
        match self.st.channels.get(channel as usize) {
            Some(ChannelSlot::Capture(slot)) => Ok(slot),
            Some(_) => Err(TimerError::WrongChannelKind),
            None => Err(TimerError::InvalidChannel),
        }
    }

    pub(crate) fn capture_slot(&mut self, channel: u8) -> TimerResult<&mut CaptureSlot> {
        match self.st.channels.get_mut(channel as usize) {
            Some(ChannelSlot::Capture(slot)) => Ok(slot),
            Some(_) => Err(TimerError::WrongChannelKind),
            None => Err(TimerError::InvalidChannel),
        }
    }

    fn capture_activate(&mut self, channel: u8) -> TimerResult<()> {
        let hw = self.hw;
        let slot = self.capture_slot(channel)?;
        if !slot.flags.contains(PulseFlags::ENABLED) {
            return Err(TimerError::NotEnabled);
        }
        hw.set_channel_interrupt(channel, false);
        hw.configure_capture(channel, CaptureMode::Both, slot.input);
        hw.clear_capture_overrun(channel);
        hw.clear_channel_flag(channel);
        hw.set_channel_interrupt(channel, true);
        slot.flags.insert(PulseFlags::ACTIVE);
        Ok(())
    }

    fn capture_deactivate(&mut self, channel: u8) -> TimerResult<()> {
        let hw = self.hw;
        let slot = self.capture_slot(channel)?;
        hw.set_channel_interrupt(channel, false);
        hw.configure_capture(channel, CaptureMode::Compare, slot.input);
        hw.clear_channel_flag(channel);
        slot.flags.remove(PulseFlags::ACTIVE);
        Ok(())
    }

    pub(crate) fn on_capture(&mut self, channel: u8) -> IsrResult {
        let hw = self.hw;
        let now = self.now();
        let Ok(slot) = self.capture_slot(channel) else {
            hw.set_channel_interrupt(channel, false);
            return IsrResult::CONTINUE;
        };
        let stamp = extend_stamp(hw.compare(channel), now);

        let notify = if hw.capture_overrun(channel) {
            hw.clear_capture_overrun(channel);
            slot.flags.remove(VALID);
            slot.flags.insert(PulseFlags::OVERFLOW);
            true
        } else if !slot.flags.contains(PulseFlags::START_VALID) {
            slot.start = stamp;
            slot.flags.set(PulseFlags::ACTIVE_HIGH, hw.capture_input(channel));
            slot.flags.insert(PulseFlags::START_VALID);
            slot.flags.contains(PulseFlags::START_CALLBACK)
        } else if !slot.flags.contains(PulseFlags::END_VALID) {
            slot.end = stamp;
            slot.flags.insert(PulseFlags::END_VALID);
            slot.flags.contains(PulseFlags::END_CALLBACK)
        } else {
            slot.flags.remove(VALID);
            slot.flags.insert(PulseFlags::OVERFLOW);
            true
        };
        trace!("capture {channel}: {stamp:#010x} flags {:#x}", slot.flags.bits());

        let Some(callback) = slot.callback.filter(|_| notify) else {
            return IsrResult::CONTINUE;
        };
        let result = callback(&mut PulseContext {
            timer: IsrTimer { core: &mut *self },
            channel,
        });
        if result.disables() {
            hw.set_channel_interrupt(channel, false);
            if let Ok(slot) = self.capture_slot(channel) {
                slot.flags.remove(PulseFlags::ACTIVE);
            }
        }
        result.propagated()
    }
}

/// Pulse capture bound to one channel of a [`Timer`].
pub struct PulseCapture<'t, H, const M: usize = MUX_CAPACITY> {
    timer: &'t Timer<H, M>,
    channel: u8,
}

impl<'t, H: TimerHardware, const M: usize> PulseCapture<'t, H, M> {
    /// Binds `channel`. Only the `START_CALLBACK` and `END_CALLBACK` bits
    /// of `notify` are used.
    pub fn initialize(
        timer: &'t Timer<H, M>,
        channel: u8,
        input: CaptureInput,
        notify: PulseFlags,
        callback: Option<PulseCallback>,
    ) -> TimerResult<Self> {
        timer.with_core(|core| {
            core.claim(
                channel,
                ChannelSlot::Capture(CaptureSlot {
                    flags: notify & NOTIFY,
                    start: 0,
                    end: 0,
                    input,
                    callback,
                }),
            )
        })?;
        debug!("pulse capture bound to channel {channel}");
        Ok(Self { timer, channel })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut CaptureSlot) -> R) -> TimerResult<R> {
        self.timer
            .with_core(|core| core.capture_slot(self.channel).map(f))
    }

    /// Links the capture to the channel interrupt dispatch.
    pub fn enable(&self) -> TimerResult<()> {
        self.with_slot(|slot| slot.flags.insert(PulseFlags::ENABLED))
    }

    /// Stops capturing and unlinks the capture.
    pub fn disable(&self) -> TimerResult<()> {
        self.timer.with_core(|core| {
            core.capture_deactivate(self.channel)?;
            core.capture_slot(self.channel)?
                .flags
                .remove(PulseFlags::ENABLED);
            Ok(())
        })
    }

    /// Starts capturing both edges.
    pub fn activate(&self) -> TimerResult<()> {
        self.timer.with_core(|core| core.capture_activate(self.channel))
    }

    pub fn deactivate(&self) -> TimerResult<()> {
        self.timer.with_core(|core| core.capture_deactivate(self.channel))
    }

    /// Discards recorded timestamps and clears the overflow flag.
    pub fn clear(&self) -> TimerResult<()> {
        self.with_slot(CaptureSlot::clear)
    }

    /// Flips the recorded polarity. A completed pulse's end becomes the
    /// start of the next one; a lone start is discarded.
    pub fn invert_sense(&self) -> TimerResult<()> {
        self.with_slot(|slot| {
            slot.flags.toggle(PulseFlags::ACTIVE_HIGH);
            if slot.flags.contains(VALID) {
                slot.start = slot.end;
                slot.flags.remove(PulseFlags::END_VALID);
            } else {
                slot.flags.remove(VALID);
            }
        })
    }

    pub fn snapshot(&self) -> TimerResult<PulseSnapshot> {
        self.with_slot(|slot| slot.snapshot())
    }

    pub fn flags(&self) -> TimerResult<PulseFlags> {
        self.with_slot(|slot| slot.flags)
    }

    /// Disables the capture and frees its channel.
    pub fn release(self) -> TimerResult<()> {
        self.timer.with_core(|core| {
            core.capture_deactivate(self.channel)?;
            core.release(self.channel)
        })
    }
}
