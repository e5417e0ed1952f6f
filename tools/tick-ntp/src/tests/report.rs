use tick_uptime::{NtpMode, NtpPacket, NtpSample, NtpTimestamp, UnixTime, UptimeEpoch};

use crate::{civil_string, Exchange, Report};

fn exchange(received_at: u32, provisional: bool) -> Exchange {
    let mut response = NtpPacket::client_request(NtpTimestamp::from_parts(1, 0));
    response.mode = NtpMode::Server;
    response.stratum = 2;
    Exchange {
        server: "192.0.2.1:123".parse().unwrap(),
        response,
        sample: NtpSample {
            offset: -(1 << 31),
            round_trip: 1 << 28,
        },
        provisional,
        received_at,
    }
}

#[test]
fn civil_string_formats_utc() {
    assert_eq!(
        civil_string(UnixTime::new(1_388_534_400, 250_000)).as_deref(),
        Some("2014-01-01T00:00:00.250000Z")
    );
}

#[test]
fn report_from_synchronized_epoch() {
    let mut epoch = UptimeEpoch::new(32_768).unwrap();
    epoch.set_epoch_unix(UnixTime::new(1_388_534_400, 0), 0, 0);

    let report = Report::new(3, &exchange(61 * 32_768, false), &mut epoch);
    assert_eq!(report.sequence, 3);
    assert_eq!(report.server, "192.0.2.1:123");
    assert_eq!(report.stratum, 2);
    assert_eq!(report.offset_ms, -500);
    assert_eq!(report.round_trip_us, 62_500);
    assert_eq!(report.uptime, " 1:01.000");
    assert_eq!(report.civil.as_deref(), Some("2014-01-01T00:01:01.000000Z"));

    colored::control::set_override(false);
    let text = report.to_text();
    assert!(text.contains("adj"));
    assert!(text.contains("offset -500 ms rtt 62500 us"));
    assert!(text.ends_with("2014-01-01T00:01:01.000000Z"));
}

#[test]
fn report_json_fields() {
    let mut epoch = UptimeEpoch::new(32_768).unwrap();
    let report = Report::new(1, &exchange(100, true), &mut epoch);
    assert_eq!(report.civil, None);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["sequence"], 1);
    assert_eq!(json["provisional"], true);
    assert_eq!(json["sample"]["offset"], -(1i64 << 31));
    assert_eq!(json["offset_ms"], -500);
    assert!(json["civil"].is_null());
}
