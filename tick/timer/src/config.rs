//! Timer configuration.

/// Capture/compare channels tracked per timer.
pub const MAX_CHANNELS: usize = 7;

/// Overflow listeners that can be registered per timer.
pub const MAX_OVERFLOW_LISTENERS: usize = 4;

/// Pending entries a multiplexed scheduler can hold.
pub const MUX_CAPACITY: usize = 8;

/// Minimum ticks between now and a deadline for normal arming.
pub const DEFAULT_ALARM_MARGIN: u32 = 3;

/// Per-timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Guard counter reads against asynchronous clock domains.
    pub validated_reads: bool,
    /// Channel reserved for latched counter reads.
    pub latch_channel: Option<u8>,
    /// Whether channel 0 has an interrupt handler wired to this timer.
    pub cc0_available: bool,
    /// Deadlines closer than this are reported as too soon.
    pub alarm_margin: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            validated_reads: true,
            latch_channel: None,
            cc0_available: true,
            alarm_margin: DEFAULT_ALARM_MARGIN,
        }
    }
}

impl TimerConfig {
    /// Creates a new timer configuration builder.
    pub fn builder() -> TimerConfigBuilder {
        TimerConfigBuilder::default()
    }

    /// True if `channel` is unavailable for alarms and captures.
    pub fn is_reserved(&self, channel: u8) -> bool {
        self.latch_channel == Some(channel) || (channel == 0 && !self.cc0_available)
    }
}

/// Builder for [`TimerConfig`].
#[derive(Debug, Clone, Default)]
pub struct TimerConfigBuilder {
    config: TimerConfig,
}

impl TimerConfigBuilder {
    /// Enables or disables validated counter reads.
    pub fn validated_reads(mut self, enabled: bool) -> Self {
        self.config.validated_reads = enabled;
        self
    }

    /// Reserves `channel` for latched counter reads.
    pub fn latch_channel(mut self, channel: u8) -> Self {
        self.config.latch_channel = Some(channel);
        self
    }

    pub fn cc0_available(mut self, available: bool) -> Self {
        self.config.cc0_available = available;
        self
    }

    /// Sets the too-soon margin in ticks.
    pub fn alarm_margin(mut self, ticks: u32) -> Self {
        self.config.alarm_margin = ticks;
        self
    }

    pub fn build(self) -> TimerConfig {
        self.config
    }
}
