//! Hardware abstraction consumed by the timer services.
//!
//! Implementations wrap one 16-bit timer peripheral. Methods take `&self`
//! because peripheral registers are shared, interior-mutable state; callers
//! in `tick-timer` only touch them from inside a critical section or from
//! the timer's own interrupt handler.

/// Clock feeding a timer peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// External pin clock
    External,
    /// Auxiliary (typically 32 kHz crystal) clock
    Auxiliary,
    /// Sub-main clock derived from the core oscillator
    SubMain,
    /// Inverted external pin clock
    InvertedExternal,
}

/// Edge sensitivity of a capture channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureMode {
    /// Channel operates in compare mode
    Compare,
    Rising,
    Falling,
    Both,
}

/// Signal routed to a capture channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureInput {
    #[default]
    A,
    B,
    Ground,
    Supply,
}

/// Interrupt source reported by [`TimerHardware::take_pending`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqSource {
    /// Counter wrapped from 0xFFFF to 0
    Overflow,
    /// Capture/compare channel event
    Channel(u8),
}

/// Register-level access to a 16-bit timer with capture/compare channels.
pub trait TimerHardware {
    /// Number of capture/compare channels.
    fn channel_count(&self) -> u8;

    /// Raw counter register.
    fn counter(&self) -> u16;

    /// Writes the counter register. Only valid while the timer is halted.
    fn set_counter(&self, value: u16);

    /// Hardware overflow flag.
    fn overflow_flag(&self) -> bool;

    fn clear_overflow_flag(&self);

    fn set_overflow_interrupt(&self, enabled: bool);

    fn is_running(&self) -> bool;

    /// Stops the counter, keeping the configured mode.
    fn halt(&self);

    /// Restarts a halted counter.
    fn resume(&self);

    fn clock_source(&self) -> ClockSource;

    /// Input divider as a power of two.
    fn divider_shift(&self) -> u8;

    /// Writes a compare register.
    fn set_compare(&self, channel: u8, value: u16);

    /// Reads a compare register, which also holds the last captured value.
    fn compare(&self, channel: u8) -> u16;

    fn set_channel_interrupt(&self, channel: u8, enabled: bool);

    fn channel_interrupt_enabled(&self, channel: u8) -> bool;

    fn channel_flag(&self, channel: u8) -> bool;

    /// Raises the channel flag in software.
    fn set_channel_flag(&self, channel: u8);

    fn clear_channel_flag(&self, channel: u8);

    /// True when a capture happened before the previous one was read.
    fn capture_overrun(&self, channel: u8) -> bool;

    fn clear_capture_overrun(&self, channel: u8);

    /// Switches a channel between compare and capture operation.
    fn configure_capture(&self, channel: u8, mode: CaptureMode, input: CaptureInput);

    /// Current level of the channel's capture input.
    fn capture_input(&self, channel: u8) -> bool;

    /// Synchronously captures the counter on `channel` and returns the
    /// captured value. The channel must be reserved for this purpose.
    fn latch_counter(&self, channel: u8) -> u16;

    /// Highest-priority pending interrupt source whose interrupt is
    /// enabled, acknowledging it. Channels are reported before overflow.
    fn take_pending(&self) -> Option<IrqSource>;
}

/// Clock-tree queries used to pick a counter read strategy.
pub trait ClockTree {
    /// Frequency of the CPU clock in Hz.
    fn core_hz(&self) -> u32;

    /// Frequency of `source` in Hz, if known.
    fn source_hz(&self, source: ClockSource) -> Option<u32>;

    /// True when `source` is derived from the same oscillator as the core.
    fn is_core_synchronous(&self, source: ClockSource) -> bool;
}

/// Low-power mode control for the interrupted context.
pub trait LowPower {
    /// Leave low-power mode when the current interrupt returns.
    fn exit_on_return(&self);

    /// Enter low-power mode with interrupts enabled.
    fn enter(&self);
}
