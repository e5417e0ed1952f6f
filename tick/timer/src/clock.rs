//! Overflow-extended clock and the per-timer context.
//!
//! The hardware counter is 16 bits wide. The overflow interrupt counts
//! wraps in software, and reads join both halves into a 48-bit tick value.
//! A read taken after the counter wrapped but before the overflow
//! interrupt ran sees the overflow flag set with a small counter value and
//! accounts for the pending wrap itself, leaving the flag for the handler.
//!
//! Clock reads only touch the overflow count and read hint, which live
//! apart from the channel arena. They stay available from inside alarm,
//! capture and overflow callbacks while the arena is borrowed.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use core::ops::{Deref, DerefMut};

use critical_section::Mutex;
use log::{debug, trace, warn};
use tick_core::{
    join_extended, reached, CaptureInput, CaptureMode, ClockTree, IrqSource, IsrResult,
    TimerError, TimerHardware, TimerResult,
};

use crate::alarm::ScheduleOutcome;
use crate::config::{TimerConfig, MAX_CHANNELS, MAX_OVERFLOW_LISTENERS, MUX_CAPACITY};
use crate::context::{IsrCore, IsrTimer};
use crate::mux::{MuxAlarm, MuxAlarmId};
use crate::pulse::CaptureSlot;
use crate::slot::{AlarmKind, ChannelSlot};

/// Callback run from the overflow interrupt after the overflow count was
/// advanced. Returning a result with the disable flag unregisters the
/// listener.
pub type OverflowListener = fn(&mut OverflowContext<'_>) -> IsrResult;

/// Handle for a registered [`OverflowListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ListenerId(u8);

/// Access granted to an overflow listener.
pub struct OverflowContext<'c> {
    timer: IsrTimer<'c>,
    count: u32,
}

impl OverflowContext<'_> {
    /// Overflow count including the wrap being serviced.
    pub fn count(&self) -> u32 {
        self.count
    }
}

impl<'c> Deref for OverflowContext<'c> {
    type Target = IsrTimer<'c>;

    fn deref(&self) -> &Self::Target {
        &self.timer
    }
}

impl DerefMut for OverflowContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.timer
    }
}

/// Relationship between the timer clock and the CPU clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadHint {
    /// Not yet inferred
    #[default]
    Unknown,
    /// Timer runs from the core oscillator
    Synchronous,
    /// Asynchronous, at most a sixteenth of the core frequency
    AsyncSlow,
    /// Asynchronous and close to the core frequency
    AsyncFast,
}

/// How the counter register is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadStrategy {
    /// Single register read
    Direct,
    /// Read until two consecutive samples agree
    RepeatUntilStable,
    /// Software capture on the reserved channel
    Latched(u8),
}

/// Overflow count and read hint.
pub(crate) struct ClockState {
    overflow_count: Cell<u32>,
    hint: Cell<ReadHint>,
}

impl ClockState {
    fn strategy(&self, config: &TimerConfig) -> ReadStrategy {
        if !config.validated_reads {
            return ReadStrategy::Direct;
        }
        match self.hint.get() {
            ReadHint::Synchronous => ReadStrategy::Direct,
            ReadHint::AsyncSlow => ReadStrategy::RepeatUntilStable,
            ReadHint::AsyncFast | ReadHint::Unknown => config
                .latch_channel
                .map_or(ReadStrategy::RepeatUntilStable, ReadStrategy::Latched),
        }
    }

    fn read_counter(&self, hw: &dyn TimerHardware, config: &TimerConfig) -> u16 {
        match self.strategy(config) {
            ReadStrategy::Direct => hw.counter(),
            ReadStrategy::RepeatUntilStable => {
                let mut previous = hw.counter();
                loop {
                    let current = hw.counter();
                    if current == previous {
                        return current;
                    }
                    previous = current;
                }
            }
            ReadStrategy::Latched(channel) => hw.latch_counter(channel),
        }
    }

    fn now_extended(&self, hw: &dyn TimerHardware, config: &TimerConfig) -> u64 {
        // Counter first: a wrap after this read leaves a large value that
        // must not be corrected.
        let counter = self.read_counter(hw, config);
        let mut overflows = self.overflow_count.get();
        if counter < 0x8000 && hw.overflow_flag() {
            overflows = overflows.wrapping_add(1);
        }
        join_extended(overflows, counter)
    }
}

pub(crate) struct TimerState<const M: usize> {
    pub(crate) listeners: [Option<OverflowListener>; MAX_OVERFLOW_LISTENERS],
    pub(crate) channels: [ChannelSlot<M>; MAX_CHANNELS],
}

/// Borrowed view of a timer inside a critical section.
pub(crate) struct TimerCore<'a, const M: usize> {
    pub(crate) hw: &'a dyn TimerHardware,
    pub(crate) config: &'a TimerConfig,
    pub(crate) clock: &'a ClockState,
    pub(crate) st: &'a mut TimerState<M>,
}

impl<const M: usize> TimerCore<'_, M> {
    pub(crate) fn read_counter(&self) -> u16 {
        self.clock.read_counter(self.hw, self.config)
    }

    pub(crate) fn now_extended(&self) -> u64 {
        self.clock.now_extended(self.hw, self.config)
    }

    pub(crate) fn now(&self) -> u32 {
        self.now_extended() as u32
    }

    pub(crate) fn overflow_count(&self) -> u32 {
        self.clock.overflow_count.get()
    }

    fn check_channel(&self, channel: u8) -> TimerResult<()> {
        if channel >= self.hw.channel_count() || channel as usize >= MAX_CHANNELS {
            return Err(TimerError::InvalidChannel);
        }
        Ok(())
    }

    fn check_free(&self, channel: u8) -> TimerResult<()> {
        self.check_channel(channel)?;
        match &self.st.channels[channel as usize] {
            ChannelSlot::Free => Ok(()),
            ChannelSlot::Reserved => Err(TimerError::ChannelReserved),
            _ => Err(TimerError::ChannelInUse),
        }
    }

    /// Binds a free channel to `slot`.
    pub(crate) fn claim(&mut self, channel: u8, slot: ChannelSlot<M>) -> TimerResult<()> {
        self.check_free(channel)?;
        self.st.channels[channel as usize] = slot;
        Ok(())
    }

    /// Returns a channel to the free pool with its interrupt disabled.
    pub(crate) fn release(&mut self, channel: u8) -> TimerResult<()> {
        self.check_channel(channel)?;
        let slot = &mut self.st.channels[channel as usize];
        if matches!(slot, ChannelSlot::Reserved) {
            return Err(TimerError::ChannelReserved);
        }
        *slot = ChannelSlot::Free;
        self.hw.set_channel_interrupt(channel, false);
        self.hw.clear_channel_flag(channel);
        Ok(())
    }

    /// Ticks between the first and the last of `count + 1` captures on a
    /// free channel, polled with the channel interrupt disabled. `idle`
    /// runs while waiting for each capture.
    pub(crate) fn capture_delta(
        &mut self,
        channel: u8,
        mode: CaptureMode,
        input: CaptureInput,
        count: u32,
        idle: &mut dyn FnMut(),
    ) -> TimerResult<u16> {
        self.check_free(channel)?;
        if mode == CaptureMode::Compare {
            return Err(TimerError::InvalidConfiguration);
        }
        let hw = self.hw;
        if !hw.is_running() {
            return Err(TimerError::NotEnabled);
        }

        hw.set_channel_interrupt(channel, false);
        hw.configure_capture(channel, mode, input);
        hw.clear_capture_overrun(channel);
        hw.clear_channel_flag(channel);

        let mut wait = || {
            while !hw.channel_flag(channel) {
                idle();
            }
        };
        // The first capture only synchronizes with the input.
        wait();
        let mut first = 0;
        for i in 0..=count {
            hw.clear_channel_flag(channel);
            wait();
            if i == 0 {
                first = hw.compare(channel);
            }
        }
        let last = hw.compare(channel);

        hw.configure_capture(channel, CaptureMode::Compare, input);
        hw.clear_capture_overrun(channel);
        hw.clear_channel_flag(channel);
        trace!("capture delta on {channel}: {count} events in {} ticks", last.wrapping_sub(first));
        Ok(last.wrapping_sub(first))
    }

    fn service(&mut self, source: IrqSource) -> IsrResult {
        match source {
            IrqSource::Overflow => self.service_overflow(),
            IrqSource::Channel(channel) => self.service_channel(channel),
        }
    }

    fn service_overflow(&mut self) -> IsrResult {
        let count = self.overflow_count().wrapping_add(1);
        self.clock.overflow_count.set(count);
        trace!("overflow {count}");

        let mut result = IsrResult::CONTINUE;
        for idx in 0..MAX_OVERFLOW_LISTENERS {
            let Some(listener) = self.st.listeners[idx] else {
                continue;
            };
            let r = listener(&mut OverflowContext {
                timer: IsrTimer { core: &mut *self },
                count,
            });
            if r.disables() {
                self.st.listeners[idx] = None;
            }
            result |= r.propagated();
        }
        self.arm_epoch_alarms();
        result
    }

    fn service_channel(&mut self, channel: u8) -> IsrResult {
        match self.st.channels.get(channel as usize) {
            Some(ChannelSlot::Alarm(_)) => self.on_alarm_compare(channel),
            Some(ChannelSlot::Capture(_)) => self.on_capture(channel),
            _ => {
                trace!("spurious interrupt on channel {channel}");
                self.hw.set_channel_interrupt(channel, false);
                IsrResult::CONTINUE
            }
        }
    }

    /// Fails unless `channel` holds a callback alarm.
    fn dedicated(&mut self, channel: u8) -> TimerResult<()> {
        match self.alarm_mut(channel)?.kind {
            AlarmKind::Callback(_) => Ok(()),
            AlarmKind::Multiplexed(_) => Err(TimerError::WrongChannelKind),
        }
    }
}

impl<const M: usize> IsrCore for TimerCore<'_, M> {
    fn now_extended(&self) -> u64 {
        TimerCore::now_extended(self)
    }

    fn overflow_count(&self) -> u32 {
        TimerCore::overflow_count(self)
    }

    fn schedule_dedicated(
        &mut self,
        channel: u8,
        deadline: u32,
        force: bool,
    ) -> TimerResult<ScheduleOutcome> {
        self.dedicated(channel)?;
        self.alarm_schedule(channel, deadline, force)
    }

    fn cancel_dedicated(&mut self, channel: u8) -> TimerResult<bool> {
        self.dedicated(channel)?;
        self.alarm_cancel(channel)
    }

    fn add_mux(&mut self, channel: u8, alarm: MuxAlarm) -> TimerResult<MuxAlarmId> {
        self.mux_add(channel, alarm)
    }

    fn remove_mux(&mut self, channel: u8, id: MuxAlarmId) -> TimerResult<MuxAlarm> {
        self.mux_remove(channel, id)
    }

    fn capture(&self, channel: u8) -> TimerResult<&CaptureSlot> {
        self.capture_ref(channel)
    }

    fn capture_mut(&mut self, channel: u8) -> TimerResult<&mut CaptureSlot> {
        self.capture_slot(channel)
    }
}

/// A 16-bit timer peripheral extended to a 48-bit monotonic clock.
///
/// The timer owns the channel arena that alarms and captures bind into.
/// Its [`isr`](Timer::isr) method must be called from every interrupt
/// vector of the peripheral. `M` is the number of pending entries each
/// multiplexed scheduler on this timer can hold.
pub struct Timer<H, const M: usize = MUX_CAPACITY> {
    hw: H,
    config: TimerConfig,
    clock: Mutex<ClockState>,
    state: Mutex<RefCell<TimerState<M>>>,
}

impl<H: TimerHardware> Timer<H> {
    /// Takes ownership of `hw` and enables its overflow interrupt.
    pub fn new(hw: H, config: TimerConfig) -> TimerResult<Self> {
        Self::with_mux_capacity(hw, config)
    }
}

impl<H: TimerHardware, const M: usize> Timer<H, M> {
    /// Like [`Timer::new`], with multiplexed schedulers holding up to `M`
    /// pending entries.
    pub fn with_mux_capacity(hw: H, config: TimerConfig) -> TimerResult<Self> {
        let channels = hw.channel_count();
        if channels as usize > MAX_CHANNELS {
            return Err(TimerError::InvalidConfiguration);
        }
        if config.latch_channel.is_some_and(|ch| ch >= channels) {
            return Err(TimerError::InvalidConfiguration);
        }

        let slots = core::array::from_fn(|idx| {
            if config.is_reserved(idx as u8) {
                ChannelSlot::Reserved
            } else {
                ChannelSlot::Free
            }
        });

        hw.clear_overflow_flag();
        hw.set_overflow_interrupt(true);
        debug!(
            "timer ready: {channels} channels, latch {:?}, mux capacity {}",
            config.latch_channel,
            M
        );

        Ok(Self {
            hw,
            config,
            clock: Mutex::new(ClockState {
                overflow_count: Cell::new(0),
                hint: Cell::new(ReadHint::Unknown),
            }),
            state: Mutex::new(RefCell::new(TimerState {
                listeners: [None; MAX_OVERFLOW_LISTENERS],
                channels: slots,
            })),
        })
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Runs `f` on the channel arena. Fails with `Busy` when called from a
    /// callback of this timer, which already holds the arena.
    pub(crate) fn with_core<R>(
        &self,
        f: impl FnOnce(&mut TimerCore<'_, M>) -> TimerResult<R>,
    ) -> TimerResult<R> {
        critical_section::with(|cs| {
            let Ok(mut st) = self.state.borrow(cs).try_borrow_mut() else {
                trace!("timer arena busy");
                return Err(TimerError::Busy);
            };
            let mut core = TimerCore {
                hw: &self.hw,
                config: &self.config,
                clock: self.clock.borrow(cs),
                st: &mut st,
            };
            f(&mut core)
        })
    }

    fn with_clock<R>(&self, f: impl FnOnce(&ClockState) -> R) -> R {
        critical_section::with(|cs| f(self.clock.borrow(cs)))
    }

    /// Low 32 bits of the extended clock.
    pub fn now(&self) -> u32 {
        self.now_extended() as u32
    }

    /// 48-bit extended clock.
    pub fn now_extended(&self) -> u64 {
        self.with_clock(|clock| clock.now_extended(&self.hw, &self.config))
    }

    /// Number of counter wraps serviced so far.
    pub fn overflow_count(&self) -> u32 {
        self.with_clock(|clock| clock.overflow_count.get())
    }

    /// Restarts the clock from zero.
    pub fn reset(&self) {
        self.set(0);
    }

    /// Loads the clock with `value`. The counter is halted around the update.
    pub fn set(&self, value: u64) {
        self.with_clock(|clock| {
            let running = self.hw.is_running();
            self.hw.halt();
            self.hw.set_counter(value as u16);
            self.hw.clear_overflow_flag();
            clock.overflow_count.set((value >> 16) as u32);
            if running {
                self.hw.resume();
            }
        });
    }

    /// Stops the counter.
    pub fn suspend(&self) {
        critical_section::with(|_| self.hw.halt());
    }

    pub fn resume(&self) {
        critical_section::with(|_| self.hw.resume());
    }

    pub fn is_running(&self) -> bool {
        self.hw.is_running()
    }

    /// Counter frequency after the input divider, if the source is known.
    pub fn frequency_hz<C: ClockTree + ?Sized>(&self, clocks: &C) -> Option<u32> {
        clocks
            .source_hz(self.hw.clock_source())
            .map(|hz| hz >> self.hw.divider_shift())
    }

    /// Classifies the timer clock against the core clock and stores the
    /// result as the read hint.
    pub fn infer_hints<C: ClockTree + ?Sized>(&self, clocks: &C) -> ReadHint {
        let hint = if clocks.is_core_synchronous(self.hw.clock_source()) {
            ReadHint::Synchronous
        } else {
            match self.frequency_hz(clocks) {
                Some(hz) if hz <= clocks.core_hz() / 16 => ReadHint::AsyncSlow,
                _ => ReadHint::AsyncFast,
            }
        };
        self.set_hint(hint);
        debug!("timer read hint {hint:?}");
        hint
    }

    pub fn set_hint(&self, hint: ReadHint) {
        self.with_clock(|clock| clock.hint.set(hint));
    }

    pub fn hint(&self) -> ReadHint {
        self.with_clock(|clock| clock.hint.get())
    }

    pub fn read_strategy(&self) -> ReadStrategy {
        self.with_clock(|clock| clock.strategy(&self.config))
    }

    pub fn add_overflow_listener(&self, listener: OverflowListener) -> TimerResult<ListenerId> {
        self.with_core(|core| {
            let idx = core
                .st
                .listeners
                .iter()
                .position(Option::is_none)
                .ok_or(TimerError::CapacityExhausted)?;
            core.st.listeners[idx] = Some(listener);
            Ok(ListenerId(idx as u8))
        })
    }

    /// Unregisters a listener. Returns false if it was already gone.
    pub fn remove_overflow_listener(&self, id: ListenerId) -> TimerResult<bool> {
        self.with_core(|core| {
            Ok(core
                .st
                .listeners
                .get_mut(id.0 as usize)
                .and_then(Option::take)
                .is_some())
        })
    }

    /// Counts ticks spanned by `count` capture events on a free channel.
    ///
    /// The first event only synchronizes with the input; the result is the
    /// difference between the captures of the next event and the one
    /// `count` events later. Blocks until the events arrive, calling
    /// `idle` while waiting (to feed a watchdog, for instance). Comparing
    /// a known-frequency input against the timer clock gives the timer's
    /// frequency.
    pub fn capture_delta(
        &self,
        channel: u8,
        mode: CaptureMode,
        input: CaptureInput,
        count: u32,
        mut idle: impl FnMut(),
    ) -> TimerResult<u16> {
        self.with_core(|core| core.capture_delta(channel, mode, input, count, &mut idle))
    }

    /// `Ok` once the low 32 bits of the clock have reached `deadline`.
    pub fn poll_deadline(&self, deadline: u32) -> nb::Result<(), Infallible> {
        if reached(self.now(), deadline) {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// `Ok` once the extended clock has reached `target`.
    pub fn poll_extended(&self, target: u64) -> nb::Result<(), Infallible> {
        if self.now_extended() >= target {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    /// Interrupt handler for every vector of the peripheral.
    ///
    /// Services each pending source once. A source raised again while
    /// its handler runs stays pending and re-enters the handler.
    pub fn isr(&self) -> IsrResult {
        let mut result = IsrResult::CONTINUE;
        for _ in 0..=self.hw.channel_count() {
            let serviced =
                self.with_core(|core| Ok(core.hw.take_pending().map(|src| core.service(src))));
            match serviced {
                Ok(Some(r)) => result |= r,
                Ok(None) => break,
                Err(err) => {
                    warn!("timer isr re-entered: {err}");
                    break;
                }
            }
        }
        result
    }
}
