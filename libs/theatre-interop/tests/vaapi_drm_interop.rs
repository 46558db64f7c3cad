// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! VAAPI → EGL DRM interop driven through the public API with a tracking
//! render context and a fake VA display.
//!
//! The test thread owns the render context, so dispatched work runs inline
//! unless a test acquires from a spawned thread.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use theatre_interop::interop::{
    CachedSurface, Interop, InteropBackend, InteropInstance, VaapiDrmInterop,
};
use theatre_interop::render::FenceStatus;
use theatre_interop::{
    BackendDevice, CodecDescriptor, ColourMatrix, ColourRange, ColourSpace, ContextDispatcher,
    DecodeSessionId, DecodeSurfaceProvider, Field, InteropConfig, InteropType, ScanType,
    SharedInterop, SurfaceFormat, VideoCodec, VideoFrame, create_interop, retrieve,
};
use theatre_interop_helpers::{
    FakeSurfacePool, FakeVaapiDisplay, TrackingRenderContext, init_test_tracing,
};

struct Rig {
    ctx: Arc<TrackingRenderContext>,
    dispatcher: ContextDispatcher,
    display: Arc<FakeVaapiDisplay>,
    pool: Arc<FakeSurfacePool>,
    interop: SharedInterop,
}

fn rig_with(handles: &[u64], config: InteropConfig) -> Rig {
    init_test_tracing();
    let ctx = TrackingRenderContext::new();
    let dispatcher = ContextDispatcher::new(ctx.clone(), config.dispatch_timeout());
    let display = FakeVaapiDisplay::new();
    let pool = FakeSurfacePool::vaapi(handles);
    let interop = create_interop(
        InteropType::VaapiEglDrm,
        BackendDevice::VaapiDrm(display.clone()),
        &dispatcher,
        pool.clone(),
        &config,
    )
    .expect("create VAAPI DRM interop");
    Rig {
        ctx,
        dispatcher,
        display,
        pool,
        interop,
    }
}

fn rig(handles: &[u64]) -> Rig {
    rig_with(handles, InteropConfig::default())
}

fn bt709() -> ColourSpace {
    ColourSpace::default()
}

impl Rig {
    fn acquire(&self, handle: u64) -> theatre_interop::TextureSet {
        self.interop
            .acquire(&self.pool.frame(handle), &bt709(), ScanType::Progressive)
    }
}

#[test]
fn test_cycling_pool_imports_each_surface_once() {
    let rig = rig(&[1, 2, 3]);

    let mut sets = Vec::new();
    for i in 0..10u64 {
        let set = rig.acquire(1 + i % 3);
        assert_eq!(set.len(), 2, "NV12 imports as two planes");
        sets.push(set);
    }

    assert_eq!(rig.display.exports(), 3);
    assert_eq!(rig.ctx.allocations(), 6);
    assert_eq!(rig.interop.cached_surfaces(), 3);
    // Same surface, same textures.
    assert_eq!(sets[0].texture_ids(), sets[3].texture_ids());
    assert_ne!(sets[0].texture_ids(), sets[1].texture_ids());
    // Every hit still synchronises with the decoder.
    assert_eq!(rig.display.syncs(), 10);
    assert_eq!(rig.display.open_fds(), 0);

    let stats = rig.interop.stats();
    assert_eq!(stats.acquires, 10);
    assert_eq!(stats.imports, 3);
    assert_eq!(stats.cache_hits, 7);
    assert_eq!(stats.zero_copy, 10);
    assert_eq!(rig.ctx.off_thread_calls(), 0);
}

#[test]
fn test_plane_layout() {
    let rig = rig(&[1]);
    let set = rig.acquire(1);
    let planes = set.textures();
    assert_eq!((planes[0].width, planes[0].height), (1920, 1080));
    assert_eq!((planes[1].width, planes[1].height), (960, 540));
    assert_eq!(planes[0].plane, 0);
    assert_eq!(planes[1].plane, 1);
    assert_eq!((set.width(), set.height()), (1920, 1080));
}

#[test]
fn test_evict_stale_releases_dropped_surfaces() {
    let rig = rig(&[1, 2, 3]);
    for handle in [1, 2, 3] {
        rig.acquire(handle);
    }
    let first = rig.acquire(1).texture_ids();

    rig.pool.set_live(&[2, 3]);
    rig.interop.evict_stale(&rig.pool.live_surfaces());

    assert_eq!(rig.interop.cached_surfaces(), 2);
    assert_eq!(rig.ctx.live_textures(), 4);
    assert!(first.iter().all(|id| !rig.ctx.is_live(*id)));
    assert_eq!(rig.interop.stats().evictions, 1);

    // Surviving surfaces stay cached.
    rig.acquire(2);
    rig.acquire(3);
    assert_eq!(rig.display.exports(), 3);
}

#[test]
fn test_non_live_surface_yields_empty_set() {
    let rig = rig(&[1, 2]);
    let set = rig.acquire(9);
    assert!(set.is_empty());
    assert_eq!(rig.display.exports(), 0);
    assert_eq!(rig.ctx.allocations(), 0);
    assert_eq!(rig.interop.stats().rejected, 1);
}

#[test]
fn test_frames_from_another_session_are_rejected() {
    let rig = rig(&[1]);
    let own = rig.pool.frame(1);
    let foreign = VideoFrame::new(
        DecodeSessionId(own.session.0 + 1),
        own.surface,
        own.codec,
        own.format,
        own.width,
        own.height,
    );
    assert!(rig.interop.acquire(&foreign, &bt709(), ScanType::Progressive).is_empty());
    assert_eq!(rig.ctx.allocations(), 0);
}

#[test]
fn test_invalid_frames_are_rejected() {
    let rig = rig(&[1]);
    let oversized = rig.pool.frame_with(1, SurfaceFormat::Nv12, 16384, 16384);
    assert!(rig.interop.acquire(&oversized, &bt709(), ScanType::Progressive).is_empty());

    let empty = rig.pool.frame_with(1, SurfaceFormat::Nv12, 0, 1080);
    assert!(rig.interop.acquire(&empty, &bt709(), ScanType::Progressive).is_empty());

    let mut vdpau = rig.pool.frame(1);
    vdpau.codec = CodecDescriptor::new(VideoCodec::H264, theatre_interop::DecodeApi::Vdpau);
    assert!(rig.interop.acquire(&vdpau, &bt709(), ScanType::Progressive).is_empty());

    assert_eq!(rig.interop.stats().rejected, 3);
    assert_eq!(rig.display.exports(), 0);
}

#[test]
fn test_cache_stays_bounded() {
    let config = InteropConfig {
        cache_capacity: 4,
        ..Default::default()
    };
    let rig = rig_with(&[1, 2, 3, 4, 5, 6, 7, 8], config);
    for handle in 1..=8 {
        assert!(!rig.acquire(handle).is_empty());
        assert!(rig.interop.cached_surfaces() <= 4);
    }
    assert_eq!(rig.interop.cached_surfaces(), 4);
    assert_eq!(rig.ctx.live_textures(), 8);
    assert_eq!(rig.interop.stats().evictions, 4);

    // 5..=8 are the most recently used.
    for handle in 5..=8 {
        rig.acquire(handle);
    }
    assert_eq!(rig.display.exports(), 8);
}

#[test]
fn test_teardown_releases_everything() {
    let rig = rig(&[1, 2, 3]);
    for handle in [1, 2, 3, 1] {
        rig.acquire(handle);
    }
    assert!(rig.ctx.live_textures() > 0);

    rig.interop.teardown().expect("teardown");

    assert_eq!(rig.ctx.leaked(), 0);
    assert_eq!(rig.display.open_fds(), 0);
    assert_eq!(rig.interop.cached_surfaces(), 0);
    assert!(rig.interop.is_closing());

    // Idempotent, and acquires after teardown produce nothing.
    rig.interop.teardown().expect("second teardown");
    assert!(rig.acquire(1).is_empty());
    assert!(rig.interop.lease().is_none());
    assert_eq!(rig.ctx.allocations(), 6);
}

#[test]
fn test_teardown_from_decode_thread_defers_deletes() {
    let rig = rig(&[1, 2]);
    rig.acquire(1);
    rig.acquire(2);

    let interop = rig.interop.clone();
    thread::spawn(move || interop.teardown())
        .join()
        .expect("teardown thread")
        .expect("teardown");

    // Deletes wait for the render thread.
    assert_eq!(rig.ctx.live_textures(), 4);
    assert!(rig.dispatcher.pump() >= 1);
    assert_eq!(rig.ctx.leaked(), 0);
    assert_eq!(rig.ctx.off_thread_calls(), 0);
}

#[test]
fn test_failing_surface_is_throttled() {
    let rig = rig(&[1, 2]);
    rig.ctx.fail_next_imports(3);

    for _ in 0..5 {
        assert!(rig.acquire(1).is_empty());
    }
    let stats = rig.interop.stats();
    assert_eq!(stats.import_failures, 3);
    assert_eq!(stats.throttled, 2);
    // Failed exports still close their fds.
    assert_eq!(rig.display.open_fds(), 0);
    assert_eq!(rig.ctx.leaked(), 0);

    // Throttling is per surface.
    assert!(!rig.acquire(2).is_empty());
}

#[test]
fn test_failing_sync_on_cached_surface_is_throttled() {
    let rig = rig(&[1, 2]);
    assert_eq!(rig.acquire(1).len(), 2);
    let syncs = rig.display.syncs();

    rig.display.fail_next_syncs(100);
    for _ in 0..20 {
        assert!(rig.acquire(1).is_empty());
    }
    let stats = rig.interop.stats();
    assert_eq!(rig.display.syncs() - syncs, 3);
    assert_eq!(stats.import_failures, 3);
    assert_eq!(stats.throttled, 17);
    // The entry itself is kept; only the sync keeps failing.
    assert_eq!(rig.display.exports(), 1);
    assert_eq!(rig.interop.cached_surfaces(), 1);

    rig.display.fail_next_syncs(0);
    assert_eq!(rig.acquire(2).len(), 2);
    rig.interop.teardown().expect("teardown");
    assert_eq!(rig.ctx.leaked(), 0);
}

#[test]
fn test_partial_import_failure_leaks_nothing() {
    let rig = rig(&[1]);
    // Luma plane imports, chroma plane does not.
    rig.ctx.set_texture_limit(Some(1));
    assert!(rig.acquire(1).is_empty());
    assert_eq!(rig.ctx.allocations(), 2, "first attempt plus the retry");
    assert_eq!(rig.ctx.leaked(), 0);
    assert_eq!(rig.display.open_fds(), 0);

    // The next attempt in the same window is still allowed.
    rig.ctx.set_texture_limit(None);
    assert_eq!(rig.acquire(1).len(), 2);
}

#[test]
fn test_export_failure_is_reported_as_empty_set() {
    let rig = rig(&[1]);
    rig.display.fail_next_exports(1);
    assert!(rig.acquire(1).is_empty());
    assert_eq!(rig.interop.stats().import_failures, 1);
    assert_eq!(rig.ctx.allocations(), 0);
}

#[test]
fn test_layer_format_mismatch_is_an_import_failure() {
    let rig = rig(&[1]);
    rig.display.set_surface_format(SurfaceFormat::P010, 1920, 1080);
    assert!(rig.acquire(1).is_empty());
    assert_eq!(rig.interop.stats().import_failures, 1);
    assert_eq!(rig.display.open_fds(), 0);
    assert_eq!(rig.ctx.allocations(), 0);
}

#[test]
fn test_resource_exhaustion_clears_cache_and_retries() {
    let rig = rig(&[1, 2, 3]);
    rig.ctx.set_texture_limit(Some(4));
    assert!(!rig.acquire(1).is_empty());
    assert!(!rig.acquire(2).is_empty());

    let third = rig.acquire(3);
    assert_eq!(third.len(), 2);
    assert_eq!(rig.interop.cached_surfaces(), 1);
    assert_eq!(rig.ctx.live_textures(), 2);

    let stats = rig.interop.stats();
    assert_eq!(stats.evictions, 2);
    assert_eq!(stats.import_failures, 0);
}

#[test]
fn test_recycled_handle_is_reimported() {
    let rig = rig(&[1]);
    let before = rig.acquire(1).texture_ids();

    rig.pool.recycle(1);
    let after = rig.acquire(1).texture_ids();

    assert_ne!(before, after);
    assert_eq!(rig.display.exports(), 2);
    assert_eq!(rig.ctx.live_textures(), 2);
    assert_eq!(rig.interop.stats().evictions, 1);
}

#[test]
fn test_stale_generation_frame_is_rejected() {
    let rig = rig(&[1]);
    let old = rig.pool.frame(1);
    rig.pool.recycle(1);
    assert!(rig.interop.acquire(&old, &bt709(), ScanType::Progressive).is_empty());
    assert_eq!(rig.display.exports(), 0);
}

#[test]
fn test_format_or_colour_change_invalidates_entry() {
    let rig = rig(&[1]);
    rig.acquire(1);

    let smaller = rig.pool.frame_with(1, SurfaceFormat::Nv12, 1280, 720);
    let set = rig.interop.acquire(&smaller, &bt709(), ScanType::Progressive);
    assert_eq!((set.width(), set.height()), (1280, 720));
    assert_eq!(rig.display.exports(), 2);

    let full_range = ColourSpace::new(ColourMatrix::Bt709, ColourRange::Full);
    rig.interop.acquire(&smaller, &full_range, ScanType::Progressive);
    assert_eq!(rig.display.exports(), 3);

    assert_eq!(rig.interop.cached_surfaces(), 1);
    assert_eq!(rig.ctx.live_textures(), 2);
    assert_eq!(rig.interop.stats().evictions, 2);
}

#[test]
fn test_interlaced_scan_marks_field() {
    let rig = rig(&[1]);
    let frame = rig.pool.frame(1);
    let top = rig.interop.acquire(&frame, &bt709(), ScanType::InterlacedTop);
    let bottom = rig.interop.acquire(&frame, &bt709(), ScanType::InterlacedBottom);
    assert_eq!(top.field(), Some(Field::Top));
    assert_eq!(bottom.field(), Some(Field::Bottom));
    assert_eq!(top.texture_ids(), bottom.texture_ids());
    assert_eq!(rig.acquire(1).field(), None);
}

#[test]
fn test_acquire_off_render_thread_goes_through_dispatcher() {
    let rig = rig(&[1]);
    let interop = rig.interop.clone();
    let frame = rig.pool.frame(1);

    let worker = thread::spawn(move || interop.acquire(&frame, &bt709(), ScanType::Progressive));
    while !worker.is_finished() {
        rig.dispatcher.pump();
        thread::sleep(Duration::from_millis(1));
    }
    let set = worker.join().expect("acquire thread");

    assert_eq!(set.len(), 2);
    assert_eq!(rig.ctx.off_thread_calls(), 0);
    assert_eq!(rig.ctx.live_textures(), 2);
}

#[test]
fn test_dispatch_timeout_reclaims_late_import() {
    let config = InteropConfig {
        dispatch_timeout_ms: 20,
        ..Default::default()
    };
    let rig = rig_with(&[1], config);
    let interop = rig.interop.clone();
    let frame = rig.pool.frame(1);

    // Nobody pumps, so the import times out.
    let set = thread::spawn(move || interop.acquire(&frame, &bt709(), ScanType::Progressive))
        .join()
        .expect("acquire thread");
    assert!(set.is_empty());
    assert_eq!(rig.interop.stats().import_failures, 1);

    // The late job runs and gives its textures back.
    assert_eq!(rig.dispatcher.pump(), 1);
    assert_eq!(rig.ctx.allocations(), 2);
    assert_eq!(rig.ctx.leaked(), 0);
    assert_eq!(rig.display.open_fds(), 0);
}

#[test]
fn test_fence_timeout_discards_import() {
    let rig = rig(&[1]);
    rig.ctx.set_fence_status(FenceStatus::TimedOut);
    assert!(rig.acquire(1).is_empty());
    assert_eq!(rig.ctx.fences_waited(), 1);
    assert_eq!(rig.ctx.leaked(), 0);
    assert_eq!(rig.interop.stats().import_failures, 1);

    rig.ctx.set_fence_status(FenceStatus::Signaled);
    assert_eq!(rig.acquire(1).len(), 2);
}

#[test]
fn test_retrieve_uses_attached_interop() {
    let rig = rig(&[1]);

    let bare = rig.pool.frame(1);
    assert!(retrieve(&bare, &bt709(), ScanType::Progressive).is_empty());

    let attached = rig.pool.frame(1).with_interop(rig.interop.clone());
    assert_eq!(retrieve(&attached, &bt709(), ScanType::Progressive).len(), 2);

    let mut software = attached.clone();
    software.codec = CodecDescriptor::software(VideoCodec::H264);
    assert!(retrieve(&software, &bt709(), ScanType::Progressive).is_empty());
}

#[test]
fn test_disabled_interop_is_not_created() {
    init_test_tracing();
    let config = InteropConfig {
        disabled_interops: vec![InteropType::VaapiEglDrm],
        ..Default::default()
    };
    let ctx = TrackingRenderContext::new();
    let dispatcher = ContextDispatcher::new(ctx, config.dispatch_timeout());
    let result = create_interop(
        InteropType::VaapiEglDrm,
        BackendDevice::VaapiDrm(FakeVaapiDisplay::new()),
        &dispatcher,
        FakeSurfacePool::vaapi(&[1]),
        &config,
    );
    assert!(matches!(result, Err(theatre_interop::InteropError::Unsupported(_))));

    let mismatched = create_interop(
        InteropType::Vdpau,
        BackendDevice::VaapiDrm(FakeVaapiDisplay::new()),
        &dispatcher,
        FakeSurfacePool::vaapi(&[1]),
        &InteropConfig::default(),
    );
    assert!(matches!(mismatched, Err(theatre_interop::InteropError::Unsupported(_))));
}

/// Parks every import until the test lets it continue.
struct GatedImport {
    inner: VaapiDrmInterop,
    importing: Sender<()>,
    resume: Receiver<()>,
}

impl InteropBackend for GatedImport {
    type Native = ();

    fn interop_type(&self) -> InteropType {
        self.inner.interop_type()
    }

    fn import(
        &mut self,
        frame: &VideoFrame,
        colour: &ColourSpace,
        scan: ScanType,
    ) -> theatre_interop::Result<CachedSurface<()>> {
        self.importing.send(()).expect("signal import");
        self.resume
            .recv_timeout(Duration::from_secs(5))
            .expect("import resumed");
        self.inner.import(frame, colour, scan)
    }

    fn refresh(
        &mut self,
        frame: &VideoFrame,
        colour: &ColourSpace,
        scan: ScanType,
        cached: &mut CachedSurface<()>,
    ) -> theatre_interop::Result<()> {
        self.inner.refresh(frame, colour, scan, cached)
    }

    fn release(&mut self, cached: CachedSurface<()>) {
        self.inner.release(cached);
    }

    fn teardown(&mut self) {
        self.inner.teardown();
    }
}

#[test]
fn test_live_set_parked_during_import_is_applied_by_acquire() {
    init_test_tracing();
    let config = InteropConfig::default();
    let ctx = TrackingRenderContext::new();
    let dispatcher = ContextDispatcher::new(ctx.clone(), config.dispatch_timeout());
    let pool = FakeSurfacePool::vaapi(&[1, 2]);
    let (importing_tx, importing_rx) = crossbeam_channel::unbounded();
    let (resume_tx, resume_rx) = crossbeam_channel::unbounded();
    let backend = GatedImport {
        inner: VaapiDrmInterop::new(FakeVaapiDisplay::new(), dispatcher.clone(), &config),
        importing: importing_tx,
        resume: resume_rx,
    };
    let instance = Arc::new(
        InteropInstance::new(backend, &dispatcher, pool.clone(), &config).expect("instance"),
    );

    resume_tx.send(()).expect("resume first import");
    assert_eq!(instance.acquire(&pool.frame(1), &bt709(), ScanType::Progressive).len(), 2);
    importing_rx.recv().expect("first import");

    // Handle 1 retires while the render thread holds the state for handle 2.
    let decoder = {
        let instance = Arc::clone(&instance);
        let pool = pool.clone();
        thread::spawn(move || {
            importing_rx.recv().expect("second import started");
            pool.set_live(&[2]);
            instance.evict_stale(&pool.live_surfaces());
            resume_tx.send(()).expect("resume second import");
        })
    };
    let set = instance.acquire(&pool.frame(2), &bt709(), ScanType::Progressive);
    decoder.join().expect("decoder thread");

    assert_eq!(set.len(), 2);
    assert_eq!(instance.cached_surfaces(), 1);
    assert_eq!(instance.stats().evictions, 1);
    assert_eq!(ctx.live_textures(), 2);
}

#[test]
fn test_retire_stale_uses_provider_live_set() {
    init_test_tracing();
    let config = InteropConfig::default();
    let ctx = TrackingRenderContext::new();
    let dispatcher = ContextDispatcher::new(ctx.clone(), config.dispatch_timeout());
    let pool = FakeSurfacePool::vaapi(&[1, 2, 3]);
    let backend = VaapiDrmInterop::new(FakeVaapiDisplay::new(), dispatcher.clone(), &config);
    let instance =
        InteropInstance::new(backend, &dispatcher, pool.clone(), &config).expect("instance");

    for handle in [1, 2, 3] {
        assert_eq!(instance.acquire(&pool.frame(handle), &bt709(), ScanType::Progressive).len(), 2);
    }
    pool.set_live(&[2, 3]);
    instance.retire_stale();

    assert_eq!(instance.cached_surfaces(), 2);
    assert_eq!(ctx.live_textures(), 4);
    instance.teardown().expect("teardown");
    assert_eq!(ctx.leaked(), 0);
}
