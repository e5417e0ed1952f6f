//! One request/response round against an NTP server.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tick_uptime::{EpochError, NtpPacket, NtpSample, UptimeEpoch};
use tokio::net::{lookup_host, UdpSocket};

use crate::HostTicks;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot resolve {0}")]
    Resolve(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("rejected response: {0}")]
    Response(#[from] EpochError),
}

/// Outcome of a successful exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub server: SocketAddr,
    pub response: NtpPacket,
    pub sample: NtpSample,
    /// Request was stamped from the provisional epoch.
    pub provisional: bool,
    pub received_at: u32,
}

pub struct NtpClient {
    socket: UdpSocket,
    server: SocketAddr,
    timeout: Duration,
}

impl NtpClient {
    pub async fn connect(server: &str, timeout: Duration) -> Result<Self, QueryError> {
        let server = lookup_host(server)
            .await?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| QueryError::Resolve(server.to_string()))?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server).await?;
        Ok(Self {
            socket,
            server,
            timeout,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Sends a request stamped from `epoch`, waits for the reply and
    /// applies the measured offset to `epoch`.
    pub async fn exchange(
        &self,
        epoch: &mut UptimeEpoch,
        ticks: &HostTicks,
    ) -> Result<Exchange, QueryError> {
        let pending = epoch.begin_ntp(ticks.now());
        self.socket.send(&pending.request().to_bytes()).await?;

        let mut buf = [0u8; 512];
        let len = tokio::time::timeout(self.timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;
        let received_at = ticks.now();

        let response = NtpPacket::from_bytes(&buf[..len])?;
        let sample = epoch.complete_ntp(&pending, &response, received_at)?;
        Ok(Exchange {
            server: self.server,
            response,
            sample,
            provisional: pending.is_provisional(),
            received_at,
        })
    }
}
