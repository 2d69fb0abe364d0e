use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tunnelstats::config::StatsConfig;
use tunnelstats::sink::RecordingSink;
use tunnelstats::{EventKind, StatEvent, StatsQueue};

fn enabled_cfg() -> StatsConfig {
    StatsConfig {
        enabled: true,
        prefix: "tunnel.".to_string(),
        ..Default::default()
    }
}

fn bench_push(c: &mut Criterion) {
    let q = StatsQueue::with_sink(&enabled_cfg(), RecordingSink::new());

    c.bench_function("push_by_name_same_key", |b| {
        let mut ts = 0u64;
        b.iter(|| {
            ts += 1;
            black_box(q.push(black_box("retrying"), ts, "t1", 1.0))
        })
    });

    c.bench_function("push_event_spread_keys", |b| {
        let mut ts = 0u64;
        b.iter(|| {
            ts += 1;
            let kind = EventKind::all()[(ts % 7) as usize];
            black_box(q.push_event(StatEvent::new(kind, ts, (ts % 64) as u32, 1.0)))
        })
    });
}

fn bench_drain(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let q = StatsQueue::with_sink(&enabled_cfg(), RecordingSink::new());

    c.bench_function("drain_448_entries", |b| {
        b.iter(|| {
            for kind in EventKind::all() {
                for tunnel in 0..64u32 {
                    q.push_event(StatEvent::new(*kind, 1, tunnel, 1.0));
                }
            }
            let report = rt.block_on(q.drain());
            q.sink().take();
            black_box(report)
        })
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_push(c);
    bench_drain(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
