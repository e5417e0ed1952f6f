//! Human-readable uptime durations.

use core::fmt;

use tick_core::time::ticks_to_ms;

/// Formats a tick duration as `M:SS.mmm`, or `H:MM:SS.mmm` once it
/// reaches an hour. Minutes are padded to two columns in the short form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeText {
    ticks: u64,
    hz: u32,
}

impl UptimeText {
    pub const fn new(ticks: u64, hz: u32) -> Self {
        Self { ticks, hz }
    }
}

impl fmt::Display for UptimeText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hz == 0 {
            return f.write_str("-");
        }
        let hz = self.hz as u64;
        let total_secs = self.ticks / hz;
        let ms = ticks_to_ms(self.ticks % hz, self.hz);
        let sec = total_secs % 60;
        let min = (total_secs / 60) % 60;
        let hours = total_secs / 3600;

        if hours > 0 {
            write!(f, "{}:{:02}:{:02}.{:03}", hours, min, sec, ms)
        } else {
            write!(f, "{:2}:{:02}.{:03}", min, sec, ms)
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UptimeText {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=u64} ticks @ {=u32} Hz", self.ticks, self.hz)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    const HZ: u32 = 32_768;

    #[test]
    fn test_short_form() {
        assert_eq!(UptimeText::new(0, HZ).to_string(), " 0:00.000");
        assert_eq!(UptimeText::new(HZ as u64 / 2, HZ).to_string(), " 0:00.500");
        assert_eq!(UptimeText::new(61 * HZ as u64 + 33, HZ).to_string(), " 1:01.001");
        assert_eq!(UptimeText::new(3599 * HZ as u64, HZ).to_string(), "59:59.000");
    }

    #[test]
    fn test_long_form() {
        assert_eq!(UptimeText::new(3600 * HZ as u64, HZ).to_string(), "1:00:00.000");
        let t = (25 * 3600 + 4 * 60 + 5) * HZ as u64 + HZ as u64 / 4;
        assert_eq!(UptimeText::new(t, HZ).to_string(), "25:04:05.250");
    }

    #[test]
    fn test_zero_frequency() {
        assert_eq!(UptimeText::new(10, 0).to_string(), "-");
    }
}
