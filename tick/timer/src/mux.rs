//! Many alarms on one channel.
//!
//! Pending entries are kept sorted by their delay from now, and the
//! underlying dedicated alarm always targets the head of the list. Entries
//! with the same deadline fire in the order they were added.

use core::fmt;
use core::ops::{Deref, DerefMut};

use heapless::Vec;
use log::{debug, warn};
use tick_core::{ticks_until, IsrResult, TimerError, TimerHardware, TimerResult};

use crate::clock::{Timer, TimerCore};
use crate::context::IsrTimer;
use crate::config::MUX_CAPACITY;
use crate::slot::{AlarmKind, AlarmSlot, ChannelSlot};

/// Callback invoked when a multiplexed entry fires. The entry is handed
/// back by value so the callback can re-add it with a new deadline.
pub type MuxCallback = fn(MuxAlarm, &mut MuxContext<'_>) -> IsrResult;

/// A deadline, callback and caller-defined tag.
#[derive(Clone, Copy)]
pub struct MuxAlarm {
    pub deadline: u32,
    pub tag: u32,
    pub callback: MuxCallback,
}

impl MuxAlarm {
    pub const fn new(deadline: u32, callback: MuxCallback) -> Self {
        Self {
            deadline,
            tag: 0,
            callback,
        }
    }

    pub const fn with_tag(mut self, tag: u32) -> Self {
        self.tag = tag;
        self
    }

    /// Same entry with the deadline moved `ticks` later.
    pub const fn advanced(mut self, ticks: u32) -> Self {
        self.deadline = self.deadline.wrapping_add(ticks);
        self
    }
}

impl fmt::Debug for MuxAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxAlarm")
            .field("deadline", &self.deadline)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Handle for a pending multiplexed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxAlarmId(u16);

pub(crate) struct MuxQueue<const M: usize> {
    pending: Vec<(MuxAlarmId, MuxAlarm), M>,
    next_id: u16,
}

impl<const M: usize> MuxQueue<M> {
    pub(crate) const fn new() -> Self {
        Self {
            pending: Vec::new(),
            next_id: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.pending.is_full()
    }

    fn allocate_id(&mut self) -> MuxAlarmId {
        loop {
            let id = MuxAlarmId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            if !self.pending.iter().any(|(p, _)| *p == id) {
                return id;
            }
        }
    }

    fn insert(&mut self, now: u32, id: MuxAlarmId, alarm: MuxAlarm) -> Result<(), MuxAlarm> {
        let delay = ticks_until(alarm.deadline, now);
        let idx = self
            .pending
            .iter()
            .position(|(_, p)| ticks_until(p.deadline, now) > delay)
            .unwrap_or(self.pending.len());
        self.pending.insert(idx, (id, alarm)).map_err(|(_, a)| a)
    }

    fn remove(&mut self, id: MuxAlarmId) -> Option<MuxAlarm> {
        let idx = self.pending.iter().position(|(p, _)| *p == id)?;
        Some(self.pending.remove(idx).1)
    }

    fn head_deadline(&self) -> Option<u32> {
        self.pending.first().map(|(_, a)| a.deadline)
    }

    fn pop_due(&mut self, now: u32, due: &mut Vec<MuxAlarm, M>) {
        while self
            .pending
            .first()
            .is_some_and(|(_, a)| ticks_until(a.deadline, now) <= 0)
        {
            let (_, alarm) = self.pending.remove(0);
            // Same capacity on both sides.
            let _ = due.push(alarm);
        }
    }
}

/// Access granted to a multiplexed callback. `add` and `remove` act on
/// the scheduler that fired; other channels go through the [`IsrTimer`].
pub struct MuxContext<'c> {
    timer: IsrTimer<'c>,
    channel: u8,
}

impl MuxContext<'_> {
    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn add(&mut self, alarm: MuxAlarm) -> TimerResult<MuxAlarmId> {
        self.timer.add_mux(self.channel, alarm)
    }

    pub fn remove(&mut self, id: MuxAlarmId) -> TimerResult<MuxAlarm> {
        self.timer.remove_mux(self.channel, id)
    }
}

impl<'c> Deref for MuxContext<'c> {
    type Target = IsrTimer<'c>;

    fn deref(&self) -> &Self::Target {
        &self.timer
    }
}

impl DerefMut for MuxContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.timer
    }
}

impl<const M: usize> TimerCore<'_, M> {
    fn mux_queue(&mut self, channel: u8) -> TimerResult<&mut MuxQueue<M>> {
        match &mut self.alarm_mut(channel)?.kind {
            AlarmKind::Multiplexed(queue) => Ok(queue),
            AlarmKind::Callback(_) => Err(TimerError::WrongChannelKind),
        }
    }

    fn mux_rearm(&mut self, channel: u8) -> TimerResult<()> {
        if let Some(head) = self.mux_queue(channel)?.head_deadline() {
            self.alarm_schedule(channel, head, true)?;
        }
        Ok(())
    }

    pub(crate) fn mux_add(&mut self, channel: u8, alarm: MuxAlarm) -> TimerResult<MuxAlarmId> {
        if self.mux_queue(channel)?.is_full() {
            return Err(TimerError::CapacityExhausted);
        }
        self.alarm_cancel(channel)?;
        let now = self.now();
        let queue = self.mux_queue(channel)?;
        let id = queue.allocate_id();
        let inserted = queue.insert(now, id, alarm);
        self.mux_rearm(channel)?;
        inserted.map_err(|_| TimerError::CapacityExhausted)?;
        Ok(id)
    }

    pub(crate) fn mux_remove(&mut self, channel: u8, id: MuxAlarmId) -> TimerResult<MuxAlarm> {
        self.alarm_cancel(channel)?;
        let removed = self.mux_queue(channel)?.remove(id);
        self.mux_rearm(channel)?;
        removed.ok_or(TimerError::NotPending)
    }

    pub(crate) fn mux_dispatch(&mut self, channel: u8) -> IsrResult {
        let now = self.now();
        let mut due: Vec<MuxAlarm, M> = Vec::new();
        match self.mux_queue(channel) {
            Ok(queue) => queue.pop_due(now, &mut due),
            Err(_) => return IsrResult::CONTINUE,
        }
        if let Err(err) = self.mux_rearm(channel) {
            warn!("mux {channel}: re-arm failed: {err}");
        }

        let mut result = IsrResult::CONTINUE;
        for alarm in due {
            let mut ctx = MuxContext {
                timer: IsrTimer { core: &mut *self },
                channel,
            };
            result |= (alarm.callback)(alarm, &mut ctx).propagated();
        }
        result
    }
}

/// Scheduler multiplexing [`MuxAlarm`] entries onto one channel. It
/// holds up to `M` pending entries, as sized by its [`Timer`].
pub struct MuxAlarmScheduler<'t, H, const M: usize = MUX_CAPACITY> {
    timer: &'t Timer<H, M>,
    channel: u8,
}

impl<'t, H: TimerHardware, const M: usize> MuxAlarmScheduler<'t, H, M> {
    /// Binds `channel` and enables its alarm.
    pub fn startup(timer: &'t Timer<H, M>, channel: u8) -> TimerResult<Self> {
        timer.with_core(|core| {
            core.claim(
                channel,
                ChannelSlot::Alarm(AlarmSlot::new(AlarmKind::Multiplexed(MuxQueue::new()))),
            )?;
            core.alarm_enable(channel)
        })?;
        debug!("mux scheduler on channel {channel}");
        Ok(Self { timer, channel })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn add(&self, alarm: MuxAlarm) -> TimerResult<MuxAlarmId> {
        self.timer.with_core(|core| core.mux_add(self.channel, alarm))
    }

    /// Removes a pending entry and hands it back.
    pub fn remove(&self, id: MuxAlarmId) -> TimerResult<MuxAlarm> {
        self.timer.with_core(|core| core.mux_remove(self.channel, id))
    }

    /// Number of entries waiting to fire.
    pub fn pending(&self) -> TimerResult<usize> {
        self.timer
            .with_core(|core| core.mux_queue(self.channel).map(|queue| queue.pending.len()))
    }

    pub fn next_deadline(&self) -> TimerResult<Option<u32>> {
        self.timer
            .with_core(|core| core.mux_queue(self.channel).map(|queue| queue.head_deadline()))
    }

    /// Entries the scheduler can hold.
    pub const fn capacity(&self) -> usize {
        M
    }

    /// Disarms the channel, drops pending entries and frees the channel.
    pub fn shutdown(self) -> TimerResult<()> {
        self.timer.with_core(|core| {
            core.alarm_disable(self.channel)?;
            let dropped = core.mux_queue(self.channel)?.pending.len();
            if dropped > 0 {
                debug!("mux {}: dropping {dropped} pending entries", self.channel);
            }
            core.release(self.channel)
        })
    }
}
