#![no_std]
#![forbid(unsafe_code)]

//! # Tick Uptime
//!
//! Maps a 32-bit uptime tick counter to civil time. An [`UptimeEpoch`]
//! holds a reference pairing of tick and NTP timestamp, refreshed from
//! NTP exchanges, and converts nearby ticks to NTP or POSIX time.

use core::fmt;

pub mod epoch;
pub mod ntp;
pub mod text;

pub use epoch::{NtpExchange, UptimeEpoch, CONVERSION_WINDOW, PROVISIONAL_EPOCH, VALIDITY_WINDOW};
pub use ntp::{
    evaluate, LeapIndicator, NtpMode, NtpPacket, NtpSample, NtpTimestamp, UnixTime,
    NTP_PACKET_LEN, NTP_PORT, NTP_UNIX_OFFSET,
};
pub use text::UptimeText;

/// Result type for epoch and NTP operations
pub type EpochResult<T> = Result<T, EpochError>;

/// Errors from epoch conversion and NTP processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochError {
    /// No epoch has been set
    NoEpoch,
    /// Tick lies too far from the epoch reference
    Stale,
    /// Tick conversion frequency is zero
    InvalidFrequency,
    /// Packet shorter than an NTP header
    PacketLength,
    /// Response origin does not match the request transmit time
    OriginMismatch,
    /// Server reports an unsynchronized clock
    Unsynchronized,
    /// Response is not from a server
    UnexpectedMode,
    /// Stratum outside 1..=15
    InvalidStratum,
    /// Response carries no transmit timestamp
    MissingTransmit,
}

impl fmt::Display for EpochError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochError::NoEpoch => write!(f, "No epoch set"),
            EpochError::Stale => write!(f, "Tick outside epoch window"),
            EpochError::InvalidFrequency => write!(f, "Invalid conversion frequency"),
            EpochError::PacketLength => write!(f, "Short NTP packet"),
            EpochError::OriginMismatch => write!(f, "NTP origin does not match request"),
            EpochError::Unsynchronized => write!(f, "NTP server is unsynchronized"),
            EpochError::UnexpectedMode => write!(f, "NTP response is not from a server"),
            EpochError::InvalidStratum => write!(f, "NTP stratum out of range"),
            EpochError::MissingTransmit => write!(f, "NTP response lacks transmit time"),
        }
    }
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for EpochError {}

#[cfg(feature = "defmt")]
impl defmt::Format for EpochError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            EpochError::NoEpoch => defmt::write!(fmt, "NoEpoch"),
            EpochError::Stale => defmt::write!(fmt, "Stale"),
            EpochError::InvalidFrequency => defmt::write!(fmt, "InvalidFrequency"),
            EpochError::PacketLength => defmt::write!(fmt, "PacketLength"),
            EpochError::OriginMismatch => defmt::write!(fmt, "OriginMismatch"),
            EpochError::Unsynchronized => defmt::write!(fmt, "Unsynchronized"),
            EpochError::UnexpectedMode => defmt::write!(fmt, "UnexpectedMode"),
            EpochError::InvalidStratum => defmt::write!(fmt, "InvalidStratum"),
            EpochError::MissingTransmit => defmt::write!(fmt, "MissingTransmit"),
        }
    }
}
