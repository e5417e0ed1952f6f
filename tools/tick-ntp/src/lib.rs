//! Host-side NTP client built on the tick uptime epoch.
//!
//! A monotonic host clock stands in for the microcontroller uptime
//! counter, so the same epoch code that runs on target can be checked
//! against real servers.

mod clock;
mod query;
mod report;

pub use clock::HostTicks;
pub use query::{Exchange, NtpClient, QueryError};
pub use report::{civil_string, Report};

#[cfg(test)]
mod tests;
