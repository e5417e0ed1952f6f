use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tick_ntp::{HostTicks, NtpClient, Report};
use tick_uptime::{UptimeEpoch, NTP_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Synchronize an uptime epoch against an NTP server")]
struct Opts {
    /// NTP server host name or address
    #[arg(default_value = "pool.ntp.org")]
    server: String,

    #[arg(short, long, default_value_t = NTP_PORT)]
    port: u16,

    /// Number of exchanges to perform
    #[arg(short = 'n', long, default_value_t = 4)]
    count: u32,

    /// Pause between exchanges
    #[arg(short, long, default_value_t = 2000, value_name = "MS")]
    interval: u64,

    /// Reply timeout
    #[arg(long, default_value_t = 400, value_name = "MS")]
    timeout: u64,

    /// Simulated uptime tick frequency
    #[arg(long, default_value_t = 32_768, value_name = "HZ")]
    frequency: u32,

    /// Print one JSON object per exchange
    #[arg(long)]
    json: bool,
}

impl Opts {
    fn server_address(&self) -> String {
        if self.server.contains(':') {
            self.server.clone()
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    let ticks = HostTicks::new(opts.frequency);
    let mut epoch = UptimeEpoch::new(opts.frequency).context("invalid tick frequency")?;
    let address = opts.server_address();
    let client = NtpClient::connect(&address, Duration::from_millis(opts.timeout))
        .await
        .with_context(|| format!("cannot reach {address}"))?;

    if !opts.json {
        println!("querying ntp://{} at {} Hz", client.server(), opts.frequency);
    }

    let mut synchronized = false;
    for sequence in 1..=opts.count {
        match client.exchange(&mut epoch, &ticks).await {
            Ok(exchange) => {
                synchronized = true;
                let report = Report::new(sequence, &exchange, &mut epoch);
                if opts.json {
                    println!("{}", report.to_json()?);
                } else {
                    println!("{}", report.to_text());
                }
            }
            Err(err) => eprintln!("{:>3} {} {err}", sequence, "error:".bright_red().bold()),
        }
        if sequence < opts.count {
            tokio::time::sleep(Duration::from_millis(opts.interval)).await;
        }
    }

    anyhow::ensure!(synchronized, "no usable response from {address}");
    Ok(())
}
