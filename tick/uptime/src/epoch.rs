//! Correlation of uptime ticks with civil time.
//!
//! The epoch is one reference pairing of a 32-bit tick with an NTP
//! timestamp. Ticks are converted by their signed distance from the
//! reference, which disambiguates the 32-bit era as long as the tick is
//! less than three-eighths of an era away. Anything farther is treated as
//! staleness: the epoch is discarded and must be set again.

use log::{debug, info, warn};

use crate::ntp::{evaluate, NtpPacket, NtpSample, NtpTimestamp, UnixTime};
use crate::{EpochError, EpochResult};

/// Ticks either side of the reference within which conversion succeeds.
pub const CONVERSION_WINDOW: u32 = 0x6000_0000;

/// Maximum epoch age, in ticks, for the epoch to count as fresh.
pub const VALIDITY_WINDOW: u32 = 0x4000_0000;

/// Civil time assumed at tick zero when no epoch is available
/// (2014-01-01T00:00:00Z).
pub const PROVISIONAL_EPOCH: NtpTimestamp = NtpTimestamp::from_parts(3_597_523_200, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reference {
    civil: NtpTimestamp,
    tick: u32,
}

/// Maps uptime ticks to NTP and POSIX time.
#[derive(Debug, Clone)]
pub struct UptimeEpoch {
    hz: u32,
    reference: Option<Reference>,
}

impl UptimeEpoch {
    /// Creates an epoch-less mapping for ticks at `hz`.
    pub fn new(hz: u32) -> EpochResult<Self> {
        if hz == 0 {
            return Err(EpochError::InvalidFrequency);
        }
        Ok(Self {
            hz,
            reference: None,
        })
    }

    pub fn frequency_hz(&self) -> u32 {
        self.hz
    }

    /// Duration of `ticks` in NTP fixed point units.
    pub fn ticks_to_ntp(&self, ticks: u32) -> u64 {
        ((ticks as u64) << 32) / self.hz as u64
    }

    /// Signed NTP duration in ticks, rounded toward negative infinity.
    pub fn ntp_to_ticks(&self, ntp: i64) -> i64 {
        ((ntp as i128 * self.hz as i128) >> 32) as i64
    }

    fn signed_ticks_to_ntp(&self, delta: i32) -> i64 {
        let magnitude = self.ticks_to_ntp(delta.unsigned_abs()) as i64;
        if delta < 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Declares that `tick` corresponds to `civil`.
    pub fn set_epoch_absolute(&mut self, civil: NtpTimestamp, tick: u32) {
        debug!("epoch {} at tick {}", civil, tick);
        self.reference = Some(Reference { civil, tick });
    }

    /// Declares that `civil` was the time at the earlier tick `when`, and
    /// re-bases the reference onto `now`.
    pub fn set_epoch_at(&mut self, civil: NtpTimestamp, when: u32, now: u32) {
        let elapsed = self.ticks_to_ntp(now.wrapping_sub(when));
        self.set_epoch_absolute(civil.wrapping_add_signed(elapsed as i64), now);
    }

    pub fn set_epoch_unix(&mut self, time: UnixTime, when: u32, now: u32) {
        self.set_epoch_at(NtpTimestamp::from_unix(time), when, now);
    }

    /// Shifts civil time by `offset` NTP units and refreshes the
    /// reference at `now`.
    pub fn adjust_epoch(&mut self, offset: i64, now: u32) -> EpochResult<()> {
        let civil = self.convert(now)?;
        debug!("epoch adjusted by {}", offset);
        self.set_epoch_absolute(civil.wrapping_add_signed(offset), now);
        Ok(())
    }

    /// True when `tick` can be converted under the current epoch.
    pub fn contains(&self, tick: u32) -> bool {
        self.reference
            .map(|r| (tick.wrapping_sub(r.tick) as i32).unsigned_abs() < CONVERSION_WINDOW)
            .unwrap_or(false)
    }

    /// Civil time of `tick`. A tick outside the conversion window
    /// invalidates the epoch.
    pub fn convert(&mut self, tick: u32) -> EpochResult<NtpTimestamp> {
        let r = self.reference.ok_or(EpochError::NoEpoch)?;
        let delta = tick.wrapping_sub(r.tick) as i32;
        if delta.unsigned_abs() >= CONVERSION_WINDOW {
            warn!("tick {} is {} from epoch reference, invalidating", tick, delta);
            self.invalidate();
            return Err(EpochError::Stale);
        }
        Ok(r.civil.wrapping_add_signed(self.signed_ticks_to_ntp(delta)))
    }

    pub fn as_unix(&mut self, tick: u32) -> EpochResult<UnixTime> {
        self.convert(tick).map(NtpTimestamp::to_unix)
    }

    /// Tick at which the epoch was last set or adjusted.
    pub fn last_update(&self) -> Option<u32> {
        self.reference.map(|r| r.tick)
    }

    /// Signed ticks since the last update.
    pub fn epoch_age(&self, now: u32) -> EpochResult<i32> {
        let r = self.reference.ok_or(EpochError::NoEpoch)?;
        Ok(now.wrapping_sub(r.tick) as i32)
    }

    /// True when an epoch exists and was refreshed within a quarter era
    /// of `now`. Does not invalidate.
    pub fn check_validity(&self, now: u32) -> bool {
        self.epoch_age(now)
            .map(|age| age.unsigned_abs() < VALIDITY_WINDOW)
            .unwrap_or(false)
    }

    pub fn is_valid(&self) -> bool {
        self.reference.is_some()
    }

    pub fn invalidate(&mut self) {
        self.reference = None;
    }

    fn provisional(&self, tick: u32) -> NtpTimestamp {
        PROVISIONAL_EPOCH.wrapping_add_signed(self.ticks_to_ntp(tick) as i64)
    }

    /// Starts an NTP exchange at `now`. The request's transmit stamp
    /// comes from the epoch when fresh, otherwise from the provisional
    /// epoch.
    pub fn begin_ntp(&mut self, now: u32) -> NtpExchange {
        let fresh = if self.check_validity(now) {
            self.convert(now).ok()
        } else {
            None
        };
        let (t1, provisional) = match fresh {
            Some(t1) => (t1, false),
            None => (self.provisional(now), true),
        };
        NtpExchange {
            request: NtpPacket::client_request(t1),
            provisional,
        }
    }

    /// Completes an exchange with the server `response` received at tick
    /// `received_at` and applies the measured offset.
    pub fn complete_ntp(
        &mut self,
        exchange: &NtpExchange,
        response: &NtpPacket,
        received_at: u32,
    ) -> EpochResult<NtpSample> {
        let t4 = if exchange.provisional {
            self.provisional(received_at)
        } else {
            self.convert(received_at)?
        };
        let sample = evaluate(Some(&exchange.request), response, t4)?;

        if exchange.provisional {
            self.set_epoch_absolute(t4.wrapping_add_signed(sample.offset), received_at);
        } else {
            self.adjust_epoch(sample.offset, received_at)?;
        }
        info!(
            "ntp offset {} ms, rtt {} us",
            sample.offset_ms(),
            sample.round_trip_us()
        );
        Ok(sample)
    }
}

/// An NTP request awaiting its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpExchange {
    request: NtpPacket,
    provisional: bool,
}

impl NtpExchange {
    pub fn request(&self) -> &NtpPacket {
        &self.request
    }

    /// True when the request was stamped from the provisional epoch.
    pub fn is_provisional(&self) -> bool {
        self.provisional
    }
}
