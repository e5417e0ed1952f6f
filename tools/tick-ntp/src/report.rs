//! Report Formatter
//!
//! Formats exchange results for display

use chrono::{DateTime, SecondsFormat};
use colored::Colorize;
use serde::Serialize;
use tick_uptime::{NtpSample, UnixTime, UptimeEpoch, UptimeText};

use crate::Exchange;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub sequence: u32,
    pub server: String,
    pub stratum: u8,
    pub provisional: bool,
    pub sample: NtpSample,
    pub offset_ms: i32,
    pub round_trip_us: i64,
    pub uptime: String,
    pub civil: Option<String>,
}

impl Report {
    pub fn new(sequence: u32, exchange: &Exchange, epoch: &mut UptimeEpoch) -> Self {
        let civil = epoch
            .as_unix(exchange.received_at)
            .ok()
            .and_then(civil_string);
        Self {
            sequence,
            server: exchange.server.to_string(),
            stratum: exchange.response.stratum,
            provisional: exchange.provisional,
            sample: exchange.sample,
            offset_ms: exchange.sample.offset_ms(),
            round_trip_us: exchange.sample.round_trip_us(),
            uptime: UptimeText::new(exchange.received_at as u64, epoch.frequency_hz())
                .to_string(),
            civil,
        }
    }

    pub fn to_text(&self) -> String {
        let action = if self.provisional {
            "set".bright_yellow()
        } else {
            "adj".bright_green()
        };
        format!(
            "{:>3} [{}] {} {} stratum {} offset {} ms rtt {} us => {}",
            self.sequence,
            self.uptime.dimmed(),
            self.server,
            action,
            self.stratum,
            self.offset_ms,
            self.round_trip_us,
            self.civil.as_deref().unwrap_or("-")
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// RFC 3339 rendering of a POSIX time, microsecond precision.
pub fn civil_string(time: UnixTime) -> Option<String> {
    DateTime::from_timestamp(time.secs, time.micros * 1000)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
}
