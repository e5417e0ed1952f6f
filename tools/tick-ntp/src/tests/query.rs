use std::time::Duration;

use tick_uptime::{NtpMode, NtpPacket, NtpTimestamp, UptimeEpoch, NTP_PACKET_LEN};
use tokio::net::UdpSocket;

use crate::{HostTicks, NtpClient, QueryError};

/// Answers one request as a stratum 1 server running `ahead_secs` ahead
/// of the request's transmit stamp.
async fn serve_once(socket: UdpSocket, ahead_secs: u32, mode: NtpMode) {
    let mut buf = [0u8; 64];
    let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
    assert_eq!(len, NTP_PACKET_LEN);
    let request = NtpPacket::from_bytes(&buf[..len]).unwrap();
    assert_eq!(request.mode, NtpMode::Client);

    let now = NtpTimestamp::from_parts(request.transmit.seconds() + ahead_secs, request.transmit.fraction());
    let mut reply = NtpPacket::client_request(now);
    reply.mode = mode;
    reply.stratum = 1;
    reply.origin = request.transmit;
    reply.receive = now;
    socket.send_to(&reply.to_bytes(), peer).await.unwrap();
}

async fn local_server() -> (UdpSocket, String) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap().to_string();
    (socket, addr)
}

#[tokio::test]
async fn exchange_sets_epoch_from_server() {
    let (server, addr) = local_server().await;
    let task = tokio::spawn(serve_once(server, 500, NtpMode::Server));

    let ticks = HostTicks::new(32_768);
    let mut epoch = UptimeEpoch::new(ticks.frequency_hz()).unwrap();
    let client = NtpClient::connect(&addr, Duration::from_secs(2)).await.unwrap();
    let result = client.exchange(&mut epoch, &ticks).await.unwrap();
    task.await.unwrap();

    assert!(result.provisional);
    assert_eq!(result.response.stratum, 1);
    assert!((result.sample.offset_ms() - 500_000).abs() < 2_000);
    assert!(epoch.check_validity(result.received_at));
}

#[tokio::test]
async fn rejected_reply_is_reported() {
    let (server, addr) = local_server().await;
    let task = tokio::spawn(serve_once(server, 0, NtpMode::Client));

    let ticks = HostTicks::new(32_768);
    let mut epoch = UptimeEpoch::new(ticks.frequency_hz()).unwrap();
    let client = NtpClient::connect(&addr, Duration::from_secs(2)).await.unwrap();
    let err = client.exchange(&mut epoch, &ticks).await.unwrap_err();
    task.await.unwrap();

    assert!(matches!(err, QueryError::Response(_)));
    assert!(!epoch.is_valid());
}

#[tokio::test]
async fn silent_server_times_out() {
    let (_server, addr) = local_server().await;
    let ticks = HostTicks::new(32_768);
    let mut epoch = UptimeEpoch::new(ticks.frequency_hz()).unwrap();
    let client = NtpClient::connect(&addr, Duration::from_millis(50)).await.unwrap();

    let err = client.exchange(&mut epoch, &ticks).await.unwrap_err();
    assert!(matches!(err, QueryError::Timeout(_)));
}
