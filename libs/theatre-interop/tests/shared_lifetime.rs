// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Lifetime of an interop shared between the decode and render threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use theatre_interop::{
    BackendDevice, ColourSpace, ContextDispatcher, DecodeSurfaceProvider, InteropConfig,
    InteropError, InteropType, ScanType, SharedInterop, create_interop, retrieve,
};
use theatre_interop_helpers::{
    FakeSurfacePool, FakeVaapiDisplay, TrackingRenderContext, init_test_tracing,
};

fn setup(
    handles: &[u64],
    config: &InteropConfig,
) -> (
    Arc<TrackingRenderContext>,
    ContextDispatcher,
    Arc<FakeSurfacePool>,
    SharedInterop,
) {
    init_test_tracing();
    let ctx = TrackingRenderContext::new();
    let dispatcher = ContextDispatcher::new(ctx.clone(), config.dispatch_timeout());
    let pool = FakeSurfacePool::vaapi(handles);
    let interop = create_interop(
        InteropType::VaapiEglDrm,
        BackendDevice::VaapiDrm(FakeVaapiDisplay::new()),
        &dispatcher,
        pool.clone(),
        config,
    )
    .expect("create interop");
    (ctx, dispatcher, pool, interop)
}

#[test]
fn test_teardown_waits_for_lease_on_other_thread() {
    let (ctx, _dispatcher, pool, interop) = setup(&[1, 2], &InteropConfig::default());
    interop.acquire(&pool.frame(1), &ColourSpace::default(), ScanType::Progressive);
    assert_eq!(ctx.live_textures(), 2);

    let (held_tx, held_rx) = crossbeam_channel::bounded(1);
    let returned = Arc::new(AtomicBool::new(false));
    let worker = {
        let interop = interop.clone();
        let returned = Arc::clone(&returned);
        thread::spawn(move || {
            let lease = interop.lease().expect("lease before teardown");
            held_tx.send(()).expect("signal lease held");
            thread::sleep(Duration::from_millis(50));
            // Still usable while teardown waits.
            assert_eq!(lease.cached_surfaces(), 1);
            returned.store(true, Ordering::SeqCst);
            drop(lease);
        })
    };

    held_rx.recv().expect("lease held");
    assert_eq!(interop.active_leases(), 1);
    interop.teardown().expect("teardown");

    assert!(returned.load(Ordering::SeqCst));
    assert_eq!(interop.active_leases(), 0);
    assert_eq!(ctx.leaked(), 0);
    worker.join().expect("worker");
}

#[test]
fn test_drain_timeout_keeps_interop_closed() {
    let config = InteropConfig {
        drain_timeout_ms: 30,
        ..Default::default()
    };
    let (ctx, _dispatcher, pool, interop) = setup(&[1], &config);
    let frame = pool.frame(1);

    let lease = interop.lease().expect("lease");
    let result = interop.teardown();
    assert!(matches!(result, Err(InteropError::DrainTimeout(30))));

    // Closed to new users, but the outstanding lease still works.
    assert!(interop.is_closing());
    assert!(interop.lease().is_none());
    assert!(interop.acquire(&frame, &ColourSpace::default(), ScanType::Progressive).is_empty());
    assert_eq!(
        lease.acquire(&frame, &ColourSpace::default(), ScanType::Progressive).len(),
        2
    );
    assert_eq!(ctx.live_textures(), 2);

    // The last reference finishes the job.
    drop(lease);
    drop(interop);
    assert_eq!(ctx.leaked(), 0);
}

#[test]
fn test_last_reference_tears_down() {
    let (ctx, _dispatcher, pool, interop) = setup(&[1, 2], &InteropConfig::default());
    let frames: Vec<_> = [1, 2]
        .into_iter()
        .map(|handle| pool.frame(handle).with_interop(interop.clone()))
        .collect();
    assert_eq!(interop.references(), 3);

    for frame in &frames {
        assert_eq!(retrieve(frame, &ColourSpace::default(), ScanType::Progressive).len(), 2);
    }
    assert_eq!(ctx.live_textures(), 4);

    drop(interop);
    assert_eq!(ctx.live_textures(), 4, "frames still hold the interop");
    drop(frames);
    assert_eq!(ctx.leaked(), 0);
}

#[test]
fn test_decode_thread_eviction_races_render_thread() {
    let (ctx, dispatcher, pool, interop) = setup(&[1, 2, 3, 4], &InteropConfig::default());
    let stop = Arc::new(AtomicBool::new(false));

    let decoder = {
        let interop = interop.clone();
        let pool = pool.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut round = 0u64;
            while !stop.load(Ordering::SeqCst) {
                if round % 2 == 0 {
                    pool.set_live(&[1, 2]);
                } else {
                    pool.set_live(&[1, 2, 3, 4]);
                }
                interop.evict_stale(&pool.live_surfaces());
                round += 1;
                thread::yield_now();
            }
        })
    };

    for i in 0..400u64 {
        let handle = 1 + i % 4;
        let set = interop.acquire(&pool.frame(handle), &ColourSpace::default(), ScanType::Progressive);
        if handle <= 2 {
            assert_eq!(set.len(), 2);
        }
        dispatcher.pump();
    }

    stop.store(true, Ordering::SeqCst);
    decoder.join().expect("decoder thread");
    dispatcher.pump();

    assert!(interop.cached_surfaces() <= 4);
    interop.teardown().expect("teardown");
    dispatcher.pump();
    assert_eq!(ctx.leaked(), 0);
    assert_eq!(ctx.off_thread_calls(), 0);
}
