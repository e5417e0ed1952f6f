#![no_std]
#![forbid(unsafe_code)]

//! # Tick Timer
//!
//! Timed services multiplexed onto one free-running 16-bit hardware
//! counter:
//!
//! - [`Timer`]: the per-peripheral context, extending the counter to a
//!   48-bit clock with a software overflow count.
//! - [`DedicatedAlarm`]: one deadline and callback per capture/compare
//!   channel.
//! - [`MuxAlarmScheduler`]: any number of deadlines sharing one channel.
//! - [`PulseCapture`]: start/end timestamps of an external pulse.
//! - [`SleepAlarm`]: low-power sleep until a deadline.
//! - [`TickDelay`]: blocking delays on top of the extended clock.
//!
//! All state shared with the interrupt handler lives in a
//! `critical_section::Mutex`, so the platform must provide a
//! `critical-section` implementation. Callbacks reach the timer through
//! their context, which dereferences to an [`IsrTimer`].

#[cfg(test)]
extern crate std;

pub mod alarm;
pub mod clock;
pub mod config;
pub mod context;
pub mod delay;
pub mod mux;
pub mod pulse;
pub mod sleep;

mod slot;

pub use alarm::{AlarmCallback, AlarmContext, AlarmState, DedicatedAlarm, ScheduleOutcome};
pub use clock::{ListenerId, OverflowContext, OverflowListener, ReadHint, ReadStrategy, Timer};
pub use config::{
    TimerConfig, TimerConfigBuilder, DEFAULT_ALARM_MARGIN, MAX_CHANNELS, MAX_OVERFLOW_LISTENERS,
    MUX_CAPACITY,
};
pub use context::IsrTimer;
pub use delay::TickDelay;
pub use mux::{MuxAlarm, MuxAlarmId, MuxAlarmScheduler, MuxCallback, MuxContext};
pub use pulse::{PulseCallback, PulseCapture, PulseContext, PulseFlags, PulseSnapshot};
pub use sleep::SleepAlarm;

pub use tick_core::{IsrResult, LowPower, TimerError, TimerResult, Wake};

#[cfg(test)]
mod tests;
