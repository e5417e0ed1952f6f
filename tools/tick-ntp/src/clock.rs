use std::time::Instant;

/// 32-bit tick counter derived from the host monotonic clock.
#[derive(Debug, Clone)]
pub struct HostTicks {
    start: Instant,
    hz: u32,
}

impl HostTicks {
    pub fn new(hz: u32) -> Self {
        Self {
            start: Instant::now(),
            hz,
        }
    }

    pub fn frequency_hz(&self) -> u32 {
        self.hz
    }

    /// Ticks since creation, wrapping like the target's uptime counter.
    pub fn now(&self) -> u32 {
        let nanos = self.start.elapsed().as_nanos();
        (nanos * self.hz as u128 / 1_000_000_000) as u32
    }
}
