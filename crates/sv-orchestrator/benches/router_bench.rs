//! Criterion benchmarks for command dispatch through the event router.
//!
//! Pointer input is the hottest command a client surface sends, so dispatch
//! cost is measured for it with a growing number of unrelated scoped
//! listeners registered alongside the one that matches.
//!
//! Run with:
//! ```bash
//! cargo bench --package sv-orchestrator --bench router_bench
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sv_core::{ButtonMask, Command, CommandKind, SurfaceId};
use sv_orchestrator::infrastructure::event_router::{EventRouter, Subscription};

fn mouse_move(x: i32) -> Command {
    Command::ClientMouseInput {
        x,
        y: 540,
        button_mask: ButtonMask::default(),
        button_mask_state: ButtonMask::default(),
    }
}

/// One matching listener on surface 1 plus `others` listeners on other surfaces.
fn router_with_listeners(others: u32) -> (EventRouter, Vec<Subscription>, Arc<AtomicU64>) {
    let router = EventRouter::detached();
    let hits = Arc::new(AtomicU64::new(0));
    let mut subscriptions = Vec::new();

    let counter = hits.clone();
    subscriptions.push(router.subscribe(
        CommandKind::ClientMouseInput,
        Some(SurfaceId(1)),
        move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        },
    ));
    for surface in 0..others {
        subscriptions.push(router.subscribe(
            CommandKind::ClientMouseInput,
            Some(SurfaceId(surface + 2)),
            |_| {},
        ));
    }
    (router, subscriptions, hits)
}

fn bench_dispatch_single_listener(c: &mut Criterion) {
    let (router, _subscriptions, _hits) = router_with_listeners(0);
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("mouse_input_one_listener", |b| {
        b.iter(|| router.dispatch(black_box(SurfaceId(1)), black_box(mouse_move(960))))
    });

    group.bench_function("routing_miss", |b| {
        b.iter(|| router.dispatch(black_box(SurfaceId(1)), black_box(Command::HostDisconnect)))
    });

    group.finish();
}

fn bench_dispatch_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_scaling");

    for &others in &[1u32, 8, 32, 128] {
        let (router, _subscriptions, _hits) = router_with_listeners(others);
        group.bench_with_input(BenchmarkId::new("scoped_listeners", others), &others, |b, _| {
            b.iter(|| router.dispatch(black_box(SurfaceId(1)), black_box(mouse_move(960))))
        });
    }

    group.finish();
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let router = EventRouter::detached();
    let mut group = c.benchmark_group("subscription");

    group.bench_function("subscribe_then_drop", |b| {
        b.iter(|| {
            let sub = router.subscribe(
                black_box(CommandKind::RendererReady),
                Some(SurfaceId(7)),
                |_| {},
            );
            drop(sub);
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch_single_listener,
    bench_dispatch_scaling,
    bench_subscribe_unsubscribe,
);
criterion_main!(benches);
