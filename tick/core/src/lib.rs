#![no_std]
#![forbid(unsafe_code)]

//! # Tick Core
//!
//! Shared vocabulary for the tick timer HAL: error types, interrupt
//! return values, wrapping tick arithmetic and the traits through which
//! the timer services talk to the hardware and the clock tree.

use core::fmt;

pub mod hw;
pub mod isr;
pub mod time;

pub use hw::*;
pub use isr::*;
pub use time::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the timer services
pub type TimerResult<T> = Result<T, TimerError>;

/// Error types for timer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Channel index is beyond what the timer provides
    InvalidChannel,
    /// Channel is reserved for counter latching or has no usable interrupt
    ChannelReserved,
    /// Channel is already bound to another alarm or capture
    ChannelInUse,
    /// Channel is bound to a different kind of service
    WrongChannelKind,
    /// Operation requires an enabled alarm or capture
    NotEnabled,
    /// Alarm already has a pending deadline
    AlreadyScheduled,
    /// Multiplexed entry is not pending
    NotPending,
    /// Fixed-capacity table is full
    CapacityExhausted,
    /// Resource must be disabled before release
    Busy,
    /// Configuration is inconsistent with the hardware
    InvalidConfiguration,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::InvalidChannel => write!(f, "Channel index out of range"),
            TimerError::ChannelReserved => write!(f, "Channel is reserved"),
            TimerError::ChannelInUse => write!(f, "Channel is already in use"),
            TimerError::WrongChannelKind => write!(f, "Channel is bound to another service"),
            TimerError::NotEnabled => write!(f, "Service is not enabled"),
            TimerError::AlreadyScheduled => write!(f, "Alarm is already scheduled"),
            TimerError::NotPending => write!(f, "Alarm entry is not pending"),
            TimerError::CapacityExhausted => write!(f, "Fixed capacity exhausted"),
            TimerError::Busy => write!(f, "Resource is busy"),
            TimerError::InvalidConfiguration => write!(f, "Invalid timer configuration"),
        }
    }
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for TimerError {}

#[cfg(feature = "defmt")]
impl defmt::Format for TimerError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            TimerError::InvalidChannel => defmt::write!(fmt, "InvalidChannel"),
            TimerError::ChannelReserved => defmt::write!(fmt, "ChannelReserved"),
            TimerError::ChannelInUse => defmt::write!(fmt, "ChannelInUse"),
            TimerError::WrongChannelKind => defmt::write!(fmt, "WrongChannelKind"),
            TimerError::NotEnabled => defmt::write!(fmt, "NotEnabled"),
            TimerError::AlreadyScheduled => defmt::write!(fmt, "AlreadyScheduled"),
            TimerError::NotPending => defmt::write!(fmt, "NotPending"),
            TimerError::CapacityExhausted => defmt::write!(fmt, "CapacityExhausted"),
            TimerError::Busy => defmt::write!(fmt, "Busy"),
            TimerError::InvalidConfiguration => defmt::write!(fmt, "InvalidConfiguration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        extern crate std;
        use std::string::ToString;

        assert_eq!(TimerError::AlreadyScheduled.to_string(), "Alarm is already scheduled");
        assert_eq!(TimerError::InvalidChannel.to_string(), "Channel index out of range");
    }
}
