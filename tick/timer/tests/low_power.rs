//! Foreground sleep loop woken by timer callbacks.

use tick_core::LowPower;
use tick_sim::{SimLowPower, SimSleep, SimTimer};
use tick_timer::{
    AlarmContext, AlarmState, DedicatedAlarm, IsrResult, MuxAlarm, MuxAlarmScheduler, MuxContext,
    SleepAlarm, Timer, TimerConfig,
};

fn wake(_ctx: &mut AlarmContext<'_>) -> IsrResult {
    IsrResult::EXIT_LOW_POWER
}

fn quiet(_alarm: MuxAlarm, _ctx: &mut MuxContext<'_>) -> IsrResult {
    IsrResult::CONTINUE
}

fn wake_mux(_alarm: MuxAlarm, _ctx: &mut MuxContext<'_>) -> IsrResult {
    IsrResult::YIELD
}

#[test]
fn alarm_wakes_sleeping_foreground() {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();
    let lpm = SimLowPower::new();
    let alarm = DedicatedAlarm::initialize(&timer, 1, wake).unwrap();
    alarm.enable().unwrap();
    alarm.schedule_in(250).unwrap();

    lpm.enter();
    let slept = tick_sim::run_until_wake(timer.hardware(), 1_000, || {
        let result = timer.isr();
        result.apply(&lpm);
        result
    });

    assert_eq!(slept, Some(250));
    assert_eq!(lpm.entries(), 1);
    assert_eq!(lpm.exits(), 1);
}

#[test]
fn quiet_callbacks_keep_sleeping() {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();
    let lpm = SimLowPower::new();
    let mux = MuxAlarmScheduler::startup(&timer, 2).unwrap();
    mux.add(MuxAlarm::new(100, quiet)).unwrap();
    mux.add(MuxAlarm::new(200, quiet)).unwrap();
    mux.add(MuxAlarm::new(300, wake_mux)).unwrap();

    let slept = tick_sim::run_until_wake(timer.hardware(), 1_000, || {
        let result = timer.isr();
        result.apply(&lpm);
        result
    });

    assert_eq!(slept, Some(300));
    assert_eq!(lpm.exits(), 1);
    assert_eq!(mux.pending(), Ok(0));
}

#[test]
fn sleep_until_returns_at_deadline() {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();
    let sleeper = SleepAlarm::initialize(&timer, 1).unwrap();
    let lpm = SimSleep::new(timer.hardware(), 10_000, || timer.isr());

    assert_eq!(sleeper.sleep_until(500, &lpm), Ok(0));
    assert_eq!(timer.now(), 500);
    assert_eq!(lpm.entries(), 1);
    assert_eq!(lpm.slept(), 500);
}

#[test]
fn early_wake_stops_when_asked() {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();
    let sleeper = SleepAlarm::initialize(&timer, 1).unwrap();
    let other = DedicatedAlarm::initialize(&timer, 2, wake).unwrap();
    other.enable().unwrap();
    other.schedule(200).unwrap();
    let lpm = SimSleep::new(timer.hardware(), 10_000, || timer.isr());

    let other_fired = || other.state() == Ok(AlarmState::Enabled);
    assert_eq!(sleeper.sleep_for(1_000, &lpm, other_fired), Ok(800));
    assert_eq!(timer.now(), 200);
    assert_eq!(lpm.entries(), 1);
}

#[test]
fn early_wake_sleeps_again() {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();
    let sleeper = SleepAlarm::initialize(&timer, 1).unwrap();
    let other = DedicatedAlarm::initialize(&timer, 2, wake).unwrap();
    other.enable().unwrap();
    other.schedule(200).unwrap();
    let lpm = SimSleep::new(timer.hardware(), 10_000, || timer.isr());

    assert_eq!(sleeper.sleep_for(1_000, &lpm, || false), Ok(0));
    assert_eq!(timer.now(), 1_000);
    assert_eq!(lpm.entries(), 2);
}

#[test]
fn sleep_past_deadline_returns_at_once() {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();
    let sleeper = SleepAlarm::initialize(&timer, 1).unwrap();
    let lpm = SimSleep::new(timer.hardware(), 10_000, || timer.isr());
    tick_sim::run(timer.hardware(), 600, || timer.isr());

    assert_eq!(sleeper.sleep_until(500, &lpm), Ok(0));
    assert_eq!(lpm.entries(), 0);
    assert_eq!(timer.now(), 600);
}

#[test]
fn sleep_ms_converts_at_timer_rate() {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();
    let sleeper = SleepAlarm::initialize(&timer, 1).unwrap();
    let lpm = SimSleep::new(timer.hardware(), 100_000, || timer.isr());

    assert_eq!(sleeper.sleep_ms(10, 32_768, &lpm, || false), Ok(0));
    assert_eq!(timer.now(), 327);
    sleeper.release().unwrap();
}
