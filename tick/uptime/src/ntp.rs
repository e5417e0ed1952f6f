//! NTP timestamps, the 48-byte client/server header and offset evaluation.
//!
//! Timestamps are 32.32 fixed point seconds since 1900-01-01. Arithmetic
//! on them wraps, and differences are taken as signed 64-bit values so
//! that a provisional clock decades off still yields a usable offset.

use core::fmt;

use log::trace;

use crate::{EpochError, EpochResult};

/// Size of an NTP header without extension fields.
pub const NTP_PACKET_LEN: usize = 48;

/// Well-known NTP server port.
pub const NTP_PORT: u16 = 123;

/// Seconds from the NTP era origin (1900) to the POSIX epoch (1970).
pub const NTP_UNIX_OFFSET: u32 = 2_208_988_800;

/// A 32.32 fixed point NTP timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NtpTimestamp(u64);

impl NtpTimestamp {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn from_parts(seconds: u32, fraction: u32) -> Self {
        Self(((seconds as u64) << 32) | fraction as u64)
    }

    #[inline]
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    /// Converts POSIX time. The fraction is rounded up so that converting
    /// back yields the same microsecond.
    pub const fn from_unix(time: UnixTime) -> Self {
        let seconds = (time.secs as u32).wrapping_add(NTP_UNIX_OFFSET);
        let fraction = (((time.micros as u64) << 32) + 999_999) / 1_000_000;
        Self::from_parts(seconds, fraction as u32)
    }

    pub const fn to_unix(self) -> UnixTime {
        UnixTime {
            secs: self.seconds() as i64 - NTP_UNIX_OFFSET as i64,
            micros: ((self.fraction() as u64 * 1_000_000) >> 32) as u32,
        }
    }

    #[inline]
    pub const fn wrapping_add_signed(self, delta: i64) -> Self {
        Self(self.0.wrapping_add_signed(delta))
    }

    /// Signed distance from `earlier` to `self`.
    #[inline]
    pub const fn signed_diff(self, earlier: Self) -> i64 {
        self.0.wrapping_sub(earlier.0) as i64
    }
}

impl fmt::Display for NtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08x}", self.seconds(), self.fraction())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NtpTimestamp {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=u32}.{=u32:08x}", self.seconds(), self.fraction())
    }
}

/// POSIX time split into seconds and microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnixTime {
    pub secs: i64,
    pub micros: u32,
}

impl UnixTime {
    pub const fn new(secs: i64, micros: u32) -> Self {
        Self { secs, micros }
    }
}

/// Leap second warning carried in the top two header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LeapIndicator {
    NoWarning,
    InsertSecond,
    DeleteSecond,
    /// Server clock is not synchronized.
    Unsynchronized,
}

impl LeapIndicator {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::NoWarning,
            1 => Self::InsertSecond,
            2 => Self::DeleteSecond,
            _ => Self::Unsynchronized,
        }
    }

    const fn bits(self) -> u8 {
        match self {
            Self::NoWarning => 0,
            Self::InsertSecond => 1,
            Self::DeleteSecond => 2,
            Self::Unsynchronized => 3,
        }
    }
}

/// Association mode in the low three header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NtpMode {
    Reserved,
    SymmetricActive,
    SymmetricPassive,
    Client,
    Server,
    Broadcast,
    Control,
    Private,
}

impl NtpMode {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            0 => Self::Reserved,
            1 => Self::SymmetricActive,
            2 => Self::SymmetricPassive,
            3 => Self::Client,
            4 => Self::Server,
            5 => Self::Broadcast,
            6 => Self::Control,
            _ => Self::Private,
        }
    }

    const fn bits(self) -> u8 {
        match self {
            Self::Reserved => 0,
            Self::SymmetricActive => 1,
            Self::SymmetricPassive => 2,
            Self::Client => 3,
            Self::Server => 4,
            Self::Broadcast => 5,
            Self::Control => 6,
            Self::Private => 7,
        }
    }
}

/// NTP header, network byte order on the wire, no extension fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NtpPacket {
    pub leap: LeapIndicator,
    pub version: u8,
    pub mode: NtpMode,
    pub stratum: u8,
    /// Log2 of the poll interval in seconds.
    pub poll: i8,
    /// Log2 of the clock precision in seconds.
    pub precision: i8,
    /// 16.16 fixed point seconds.
    pub root_delay: u32,
    /// 16.16 fixed point seconds.
    pub root_dispersion: u32,
    pub reference_id: u32,
    pub reference: NtpTimestamp,
    pub origin: NtpTimestamp,
    pub receive: NtpTimestamp,
    pub transmit: NtpTimestamp,
}

impl NtpPacket {
    /// Version 4 client request stamped with `transmit`.
    pub const fn client_request(transmit: NtpTimestamp) -> Self {
        Self {
            leap: LeapIndicator::NoWarning,
            version: 4,
            mode: NtpMode::Client,
            stratum: 0,
            poll: 0,
            precision: 0,
            root_delay: 0,
            root_dispersion: 0,
            reference_id: 0,
            reference: NtpTimestamp::ZERO,
            origin: NtpTimestamp::ZERO,
            receive: NtpTimestamp::ZERO,
            transmit,
        }
    }

    pub fn to_bytes(&self) -> [u8; NTP_PACKET_LEN] {
        let mut buf = [0u8; NTP_PACKET_LEN];
        buf[0] = (self.leap.bits() << 6) | ((self.version & 0x7) << 3) | self.mode.bits();
        buf[1] = self.stratum;
        buf[2] = self.poll as u8;
        buf[3] = self.precision as u8;
        buf[4..8].copy_from_slice(&self.root_delay.to_be_bytes());
        buf[8..12].copy_from_slice(&self.root_dispersion.to_be_bytes());
        buf[12..16].copy_from_slice(&self.reference_id.to_be_bytes());
        buf[16..24].copy_from_slice(&self.reference.to_bits().to_be_bytes());
        buf[24..32].copy_from_slice(&self.origin.to_bits().to_be_bytes());
        buf[32..40].copy_from_slice(&self.receive.to_bits().to_be_bytes());
        buf[40..48].copy_from_slice(&self.transmit.to_bits().to_be_bytes());
        buf
    }

    /// Decodes the fixed header. Trailing bytes (extension fields, MAC)
    /// are ignored.
    pub fn from_bytes(bytes: &[u8]) -> EpochResult<Self> {
        if bytes.len() < NTP_PACKET_LEN {
            return Err(EpochError::PacketLength);
        }
        let word = |at: usize| u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let stamp = |at: usize| NtpTimestamp::from_parts(word(at), word(at + 4));

        Ok(Self {
            leap: LeapIndicator::from_bits(bytes[0] >> 6),
            version: (bytes[0] >> 3) & 0x7,
            mode: NtpMode::from_bits(bytes[0]),
            stratum: bytes[1],
            poll: bytes[2] as i8,
            precision: bytes[3] as i8,
            root_delay: word(4),
            root_dispersion: word(8),
            reference_id: word(12),
            reference: stamp(16),
            origin: stamp(24),
            receive: stamp(32),
            transmit: stamp(40),
        })
    }

    /// Checks that this response came from a server whose time is usable.
    pub fn check_server(&self) -> EpochResult<()> {
        if !matches!(self.mode, NtpMode::Server | NtpMode::Broadcast) {
            return Err(EpochError::UnexpectedMode);
        }
        if self.leap == LeapIndicator::Unsynchronized {
            return Err(EpochError::Unsynchronized);
        }
        if !(1..=15).contains(&self.stratum) {
            return Err(EpochError::InvalidStratum);
        }
        if self.transmit == NtpTimestamp::ZERO {
            return Err(EpochError::MissingTransmit);
        }
        Ok(())
    }
}

/// Result of one request/response exchange, in NTP fixed point units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NtpSample {
    /// Amount to add to local civil time to match the server.
    pub offset: i64,
    pub round_trip: i64,
}

impl NtpSample {
    /// Offset in milliseconds, rounded toward negative infinity and
    /// saturated to the `i32` range.
    pub fn offset_ms(&self) -> i32 {
        let ms = (self.offset as i128 * 1000) >> 32;
        ms.clamp(i32::MIN as i128, i32::MAX as i128) as i32
    }

    /// Round trip delay in microseconds.
    pub fn round_trip_us(&self) -> i64 {
        ((self.round_trip as i128 * 1_000_000) >> 32) as i64
    }
}

/// Computes clock offset and round trip delay from a server `response`
/// received at local time `t4`.
///
/// When `request` is given, the response must echo its transmit stamp.
pub fn evaluate(
    request: Option<&NtpPacket>,
    response: &NtpPacket,
    t4: NtpTimestamp,
) -> EpochResult<NtpSample> {
    if let Some(request) = request {
        if response.origin != request.transmit {
            return Err(EpochError::OriginMismatch);
        }
    }
    response.check_server()?;

    let t1 = response.origin;
    let t2 = response.receive;
    let t3 = response.transmit;

    let sum = t2.signed_diff(t1) as i128 + t3.signed_diff(t4) as i128;
    let offset = (sum / 2) as i64;
    let round_trip = t4.signed_diff(t1).wrapping_sub(t3.signed_diff(t2));

    trace!("ntp offset {} rtt {}", offset, round_trip);
    Ok(NtpSample { offset, round_trip })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Captured replies from a stratum 3 server. The first was requested
    // under the provisional epoch, the second after synchronization.
    const REPLY0: [u8; 48] = [
        0x24, 0x03, 0x03, 0xea, 0x00, 0x00, 0x11, 0x1d, 0x00, 0x00, 0x11, 0xcb, 0x32, 0x74, 0x26,
        0x9d, 0xd6, 0xd1, 0xc5, 0x6c, 0x55, 0x49, 0x1f, 0x0a, 0xd6, 0x6d, 0xd9, 0x01, 0xbf, 0xf4,
        0x00, 0x00, 0xd6, 0xd1, 0xc8, 0xda, 0xfc, 0x61, 0x70, 0x5f, 0xd6, 0xd1, 0xc8, 0xda, 0xfc,
        0x65, 0x26, 0x4f,
    ];
    const RECV0: u64 = 15_451_244_498_192_695_296;

    const REPLY1: [u8; 48] = [
        0x24, 0x03, 0x03, 0xea, 0x00, 0x00, 0x11, 0x1d, 0x00, 0x00, 0x12, 0x06, 0x32, 0x74, 0x26,
        0x9d, 0xd6, 0xd1, 0xc5, 0x6c, 0x55, 0x49, 0x1f, 0x0a, 0xd6, 0xd1, 0xc9, 0x16, 0xfb, 0xe9,
        0x4b, 0x57, 0xd6, 0xd1, 0xc9, 0x16, 0xfd, 0xf6, 0x2d, 0x28, 0xd6, 0xd1, 0xc9, 0x16, 0xfd,
        0xf8, 0x75, 0x2b,
    ];
    const RECV1: u64 = 15_479_374_494_877_961_047;

    #[test]
    fn test_decode_server_reply() {
        let p = NtpPacket::from_bytes(&REPLY0).unwrap();
        assert_eq!(p.leap, LeapIndicator::NoWarning);
        assert_eq!(p.version, 4);
        assert_eq!(p.mode, NtpMode::Server);
        assert_eq!(p.stratum, 3);
        assert_eq!(p.poll, 3);
        assert_eq!(p.precision, -22);
        assert_eq!(p.root_delay, 0x0000_111d);
        assert_eq!(p.root_dispersion, 0x0000_11cb);
        assert_eq!(p.reference_id, 0x3274_269d);
        assert_eq!(p.reference.to_bits(), 15_479_370_463_327_100_682);
        assert_eq!(p.origin.to_bits(), 15_451_244_498_116_673_536);
        assert_eq!(p.receive.to_bits(), 15_479_374_237_111_775_327);
        assert_eq!(p.transmit.to_bits(), 15_479_374_237_112_018_511);
        assert_eq!(p.to_bytes(), REPLY0);
    }

    #[test]
    fn test_short_packet_rejected() {
        assert_eq!(NtpPacket::from_bytes(&REPLY0[..47]), Err(EpochError::PacketLength));
    }

    #[test]
    fn test_client_request_header() {
        let req = NtpPacket::client_request(NtpTimestamp::from_parts(7, 9));
        let bytes = req.to_bytes();
        assert_eq!(bytes[0], 0x23);
        assert!(bytes[1..40].iter().all(|&b| b == 0));
        assert_eq!(&bytes[40..], &[0, 0, 0, 7, 0, 0, 0, 9]);
    }

    #[test]
    fn test_offset_from_provisional_epoch() {
        let p = NtpPacket::from_bytes(&REPLY0).unwrap();
        let sample = evaluate(None, &p, NtpTimestamp::from_bits(RECV0)).unwrap();
        assert_eq!(sample.offset, 28_129_738_957_212_503);
        assert_eq!(sample.offset_ms(), i32::MAX);
        assert_eq!(sample.round_trip_us(), 17_643);
    }

    #[test]
    fn test_offset_when_synchronized() {
        let p = NtpPacket::from_bytes(&REPLY1).unwrap();
        assert_eq!(p.origin.to_bits(), 15_479_374_494_801_939_287);
        let sample = evaluate(None, &p, NtpTimestamp::from_bits(RECV1)).unwrap();
        assert_eq!(sample.offset, -3_537_453);
        assert_eq!(sample.offset_ms(), -1);
        assert_eq!(sample.round_trip_us(), 17_665);
    }

    #[test]
    fn test_symmetric_exchange() {
        let at = |s: u32, ms: u32| NtpTimestamp::from_parts(s, ((ms as u64) << 32).div_ceil(1000) as u32);
        let mut p = NtpPacket::from_bytes(&REPLY1).unwrap();
        p.origin = at(1000, 0);
        p.receive = at(1005, 200);
        p.transmit = at(1005, 300);
        let sample = evaluate(None, &p, at(1000, 300)).unwrap();
        assert!((sample.offset_ms() - 5_100).abs() <= 2);
        // (T4 - T1) - (T3 - T2) = 0.3 s - 0.1 s
        assert!((sample.round_trip_us() - 200_000).abs() <= 2);
    }

    #[test]
    fn test_origin_must_match_request() {
        let p = NtpPacket::from_bytes(&REPLY1).unwrap();
        let good = NtpPacket::client_request(p.origin);
        let bad = NtpPacket::client_request(p.origin.wrapping_add_signed(1));
        assert!(evaluate(Some(&good), &p, NtpTimestamp::from_bits(RECV1)).is_ok());
        assert_eq!(
            evaluate(Some(&bad), &p, NtpTimestamp::from_bits(RECV1)),
            Err(EpochError::OriginMismatch)
        );
    }

    #[test]
    fn test_unusable_servers_rejected() {
        let base = NtpPacket::from_bytes(&REPLY1).unwrap();
        let t4 = NtpTimestamp::from_bits(RECV1);

        let mut p = base;
        p.leap = LeapIndicator::Unsynchronized;
        assert_eq!(evaluate(None, &p, t4), Err(EpochError::Unsynchronized));

        let mut p = base;
        p.mode = NtpMode::Client;
        assert_eq!(evaluate(None, &p, t4), Err(EpochError::UnexpectedMode));
        p.mode = NtpMode::Broadcast;
        assert!(evaluate(None, &p, t4).is_ok());

        let mut p = base;
        p.stratum = 0;
        assert_eq!(evaluate(None, &p, t4), Err(EpochError::InvalidStratum));
        p.stratum = 16;
        assert_eq!(evaluate(None, &p, t4), Err(EpochError::InvalidStratum));

        let mut p = base;
        p.transmit = NtpTimestamp::ZERO;
        assert_eq!(evaluate(None, &p, t4), Err(EpochError::MissingTransmit));
    }

    #[test]
    fn test_unix_conversion() {
        let t = NtpTimestamp::from_unix(UnixTime::new(1_388_534_400, 250_000));
        assert_eq!(t.seconds(), 3_597_523_200);
        assert_eq!(t.fraction(), 0x4000_0000);
        assert_eq!(t.to_unix(), UnixTime::new(1_388_534_400, 250_000));

        let t = NtpTimestamp::from_unix(UnixTime::new(0, 1));
        assert_eq!(t.to_unix(), UnixTime::new(0, 1));
    }
}
