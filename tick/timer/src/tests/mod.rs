
use tick_sim::SimTimer;

use crate::{IsrResult, Timer, TimerConfig};

pub(crate) fn sim_timer(channels: u8) -> Timer<SimTimer> {
    Timer::new(SimTimer::new(channels), TimerConfig::default()).unwrap()
}

pub(crate) fn sim_timer_with(channels: u8, config: TimerConfig) -> Timer<SimTimer> {
    Timer::new(SimTimer::new(channels), config).unwrap()
}

/// Steps the simulated counter, running the timer ISR whenever an
/// interrupt is pending.
pub(crate) fn run(timer: &Timer<SimTimer>, ticks: u32) -> IsrResult {
    tick_sim::run(timer.hardware(), ticks, || timer.isr())
}
