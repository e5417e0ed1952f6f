use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tick_sim::SimTimer;
use tick_timer::{
    IsrResult, MuxAlarm, MuxAlarmScheduler, MuxContext, ReadHint, Timer, TimerConfig,
};

fn noop(_alarm: MuxAlarm, _ctx: &mut MuxContext<'_>) -> IsrResult {
    IsrResult::CONTINUE
}

fn bench_clock_reads(c: &mut Criterion) {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();

    c.bench_function("now_direct", |b| {
        timer.set_hint(ReadHint::Synchronous);
        b.iter(|| black_box(timer.now_extended()))
    });

    c.bench_function("now_repeat_until_stable", |b| {
        timer.set_hint(ReadHint::AsyncSlow);
        b.iter(|| black_box(timer.now_extended()))
    });
}

fn bench_mux_add_remove(c: &mut Criterion) {
    let timer = Timer::new(SimTimer::new(3), TimerConfig::default()).unwrap();
    let mux = MuxAlarmScheduler::startup(&timer, 1).unwrap();
    for i in 0..6 {
        mux.add(MuxAlarm::new(1_000 + i * 100, noop)).unwrap();
    }

    c.bench_function("mux_add_remove", |b| {
        b.iter(|| {
            let id = mux.add(MuxAlarm::new(black_box(1_250), noop)).unwrap();
            black_box(mux.remove(id).unwrap());
        })
    });
}

criterion_group!(benches, bench_clock_reads, bench_mux_add_remove);
criterion_main!(benches);
