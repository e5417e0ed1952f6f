//! Tests for TimerConfig builder and its effect on channel allocation.

use tick_sim::SimTimer;
use tick_timer::{
    AlarmContext, DedicatedAlarm, IsrResult, MuxAlarmScheduler, ReadStrategy, Timer, TimerConfig,
    TimerError, DEFAULT_ALARM_MARGIN,
};

fn noop(_ctx: &mut AlarmContext<'_>) -> IsrResult {
    IsrResult::CONTINUE
}

#[test]
fn timer_config_builder() {
    let config = TimerConfig::builder()
        .validated_reads(false)
        .latch_channel(2)
        .cc0_available(false)
        .alarm_margin(8)
        .build();

    assert!(!config.validated_reads);
    assert_eq!(config.latch_channel, Some(2));
    assert!(!config.cc0_available);
    assert_eq!(config.alarm_margin, 8);
    assert!(config.is_reserved(0));
    assert!(config.is_reserved(2));
    assert!(!config.is_reserved(1));
}

#[test]
fn timer_config_default() {
    let config = TimerConfig::default();

    assert!(config.validated_reads);
    assert_eq!(config.latch_channel, None);
    assert!(config.cc0_available);
    assert_eq!(config.alarm_margin, DEFAULT_ALARM_MARGIN);
    assert!(!config.is_reserved(0));
}

#[test]
fn timer_with_custom_margin() {
    let timer = Timer::new(
        SimTimer::new(3),
        TimerConfig::builder().alarm_margin(50).build(),
    )
    .unwrap();
    let alarm = DedicatedAlarm::initialize(&timer, 1, noop).unwrap();
    alarm.enable().unwrap();

    assert_eq!(alarm.schedule(49), Ok(tick_timer::ScheduleOutcome::TooSoon));
    assert_eq!(alarm.schedule(50), Ok(tick_timer::ScheduleOutcome::Armed));
    assert_eq!(timer.config().alarm_margin, 50);
}

#[test]
fn timer_latch_channel_is_reserved() {
    let timer = Timer::new(
        SimTimer::new(3),
        TimerConfig::builder().latch_channel(1).build(),
    )
    .unwrap();

    assert_eq!(timer.read_strategy(), ReadStrategy::Latched(1));
    assert_eq!(
        MuxAlarmScheduler::startup(&timer, 1).err(),
        Some(TimerError::ChannelReserved)
    );
    assert!(MuxAlarmScheduler::startup(&timer, 2).is_ok());
}
