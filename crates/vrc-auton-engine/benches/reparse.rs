use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use vrc_auton_engine::{ContentChange, HostNotification, Session, plan_reparse, scan};
use xi_rope::Rope;
mod common;

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("reparse");
    group.sample_size(20);

    let content = common::generate_routine(1000);
    let rope = Rope::from(content.as_str());
    let nodes = scan(&content);
    let at = common::nth_offset(&content, "1000", 100);
    let change = ContentChange::new(at..at + 4, "1200");

    group.bench_function("plan_literal_edit", |b| {
        b.iter(|| {
            let plan = plan_reparse(&nodes, std::hint::black_box(&change), &rope);
            std::hint::black_box(plan);
        });
    });

    let line = common::nth_offset(&content, "  auton::intake", 100);
    let insert = ContentChange::new(line..line, "  auton::roller();\n");
    group.bench_function("plan_inserted_call", |b| {
        b.iter(|| {
            let plan = plan_reparse(&nodes, std::hint::black_box(&insert), &rope);
            std::hint::black_box(plan);
        });
    });

    group.finish();
}

fn bench_full_rescan_vs_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("reparse_vs_rescan");
    group.sample_size(10);

    let content = common::generate_routine(1000);
    let at = common::nth_offset(&content, "1000", 100);

    group.bench_function("full_rescan", |b| {
        b.iter(|| {
            let mut edited = content.clone();
            edited.replace_range(at..at + 4, "1200");
            std::hint::black_box(scan(&edited));
        });
    });

    group.bench_function("session_notification", |b| {
        b.iter_batched(
            || Session::open(&content).ok(),
            |session| {
                if let Some(mut session) = session {
                    let change = ContentChange::new(at..at + 4, "1200");
                    let _ = session.handle_host_notification(HostNotification::change(change));
                    std::hint::black_box(session);
                }
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_plan, bench_full_rescan_vs_session);
criterion_main!(benches);
