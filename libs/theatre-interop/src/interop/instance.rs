// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-stream interop instance: cache, throttle and backend behind one lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use super::stats::InteropStats;
use super::texture_cache::{CacheKey, CachedSurface, TextureCache};
use super::throttle::{FailureLog, ImportThrottle};
use super::{InteropType, TextureSet};
use crate::codec::DecodeApi;
use crate::colour::ColourSpace;
use crate::config::InteropConfig;
use crate::error::{InteropError, Result};
use crate::frame::{
    DecodeSessionId, DecodeSurfaceProvider, LiveSurfaces, ScanType, SurfaceHandle, VideoFrame,
};
use crate::render::ContextDispatcher;

/// Renderer-facing interop.
///
/// One instance serves one stream through one mechanism for its whole life.
pub trait Interop: Send + Sync {
    fn interop_type(&self) -> InteropType;

    /// Textures for `frame`, or an empty set if the frame cannot be shown.
    ///
    /// The set stays valid until the next `acquire` on this instance or
    /// until teardown.
    fn acquire(&self, frame: &VideoFrame, colour: &ColourSpace, scan: ScanType) -> TextureSet;

    /// Release cache entries for surfaces absent from `live`. Never blocks.
    fn evict_stale(&self, live: &LiveSurfaces);

    /// Release every native resource. Idempotent; later acquires are rejected.
    fn teardown(&self) -> Result<()>;

    fn is_torn_down(&self) -> bool;

    fn cached_surfaces(&self) -> usize;

    fn stats(&self) -> InteropStats;
}

/// Native half of an interop: turns one decode surface into textures.
///
/// Called with the instance lock held, so implementations need no locking
/// of their own.
pub trait InteropBackend: Send + 'static {
    /// Native objects kept alongside the textures of a cached surface.
    type Native: Send + 'static;

    fn interop_type(&self) -> InteropType;

    /// Allocate textures for `frame`'s surface.
    fn import(
        &mut self,
        frame: &VideoFrame,
        colour: &ColourSpace,
        scan: ScanType,
    ) -> Result<CachedSurface<Self::Native>>;

    /// Synchronise a cached surface with the decoder before it is drawn.
    /// Runs after every import and on every cache hit.
    fn refresh(
        &mut self,
        frame: &VideoFrame,
        colour: &ColourSpace,
        scan: ScanType,
        cached: &mut CachedSurface<Self::Native>,
    ) -> Result<()>;

    /// Destroy everything `import` allocated for one surface.
    fn release(&mut self, cached: CachedSurface<Self::Native>);

    /// Destroy backend-wide objects. Called once, after every cached
    /// surface has been released.
    fn teardown(&mut self);
}

struct InstanceState<B: InteropBackend> {
    backend: B,
    cache: TextureCache<B::Native>,
    throttle: ImportThrottle,
    stats: InteropStats,
}

impl<B: InteropBackend> InstanceState<B> {
    fn apply_eviction(&mut self, live: &LiveSurfaces) {
        let Self {
            backend,
            cache,
            throttle,
            stats,
        } = self;
        let released = cache.evict_stale(live, |_, surface| backend.release(surface));
        stats.evictions += released as u64;
        throttle.retain(live);
    }
}

/// [`Interop`] implementation shared by every backend.
pub struct InteropInstance<B: InteropBackend> {
    interop_type: InteropType,
    session: DecodeSessionId,
    api: DecodeApi,
    max_texture_size: u32,
    provider: Arc<dyn DecodeSurfaceProvider>,
    torn_down: AtomicBool,
    /// Latest live set from the decode thread, applied under the state lock.
    pending_live: Mutex<Option<LiveSurfaces>>,
    state: Mutex<InstanceState<B>>,
    span: tracing::Span,
}

impl<B: InteropBackend> InteropInstance<B> {
    pub fn new(
        backend: B,
        dispatcher: &ContextDispatcher,
        provider: Arc<dyn DecodeSurfaceProvider>,
        config: &InteropConfig,
    ) -> Result<Self> {
        let interop_type = backend.interop_type();
        let api = interop_type.decode_api().ok_or_else(|| {
            InteropError::Unsupported(format!("{} has no decode surfaces", interop_type))
        })?;
        let session = provider.session();
        let max_texture_size = dispatcher.context().max_texture_size();

        tracing::info!(
            "Created {} interop for session {} (cache {}, max texture {})",
            interop_type,
            session.0,
            config.cache_capacity,
            max_texture_size
        );

        Ok(Self {
            interop_type,
            session,
            api,
            max_texture_size,
            provider,
            torn_down: AtomicBool::new(false),
            pending_live: Mutex::new(None),
            state: Mutex::new(InstanceState {
                backend,
                cache: TextureCache::new(config.cache_capacity),
                throttle: ImportThrottle::per_second(config.max_import_attempts_per_second),
                stats: InteropStats::default(),
            }),
            span: tracing::debug_span!("interop", interop = %interop_type, session = session.0),
        })
    }

    pub fn session(&self) -> DecodeSessionId {
        self.session
    }

    /// Evict against the provider's current live set.
    pub fn retire_stale(&self) {
        self.evict_stale(&self.provider.live_surfaces());
    }

    /// Like [`Interop::acquire`], with the reason for an empty result.
    pub fn try_acquire(
        &self,
        frame: &VideoFrame,
        colour: &ColourSpace,
        scan: ScanType,
    ) -> Result<TextureSet> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(InteropError::TornDown);
        }
        if let Err(e) = self.validate(frame) {
            self.state.lock().stats.rejected += 1;
            return Err(e);
        }

        let result = {
            let mut state = self.state.lock();
            // Teardown may have completed while we waited for the lock.
            if self.torn_down.load(Ordering::Acquire) {
                return Err(InteropError::TornDown);
            }
            if let Some(live) = self.pending_live.lock().take() {
                state.apply_eviction(&live);
            }
            self.acquire_locked(&mut state, frame, colour, scan)
        };

        // A set parked while we held the lock found it busy.
        self.apply_pending();
        result
    }

    /// Apply the parked live set unless another thread holds the state.
    fn apply_pending(&self) {
        if let Some(mut state) = self.state.try_lock() {
            if let Some(live) = self.pending_live.lock().take() {
                state.apply_eviction(&live);
            }
        }
    }

    fn validate(&self, frame: &VideoFrame) -> Result<()> {
        if frame.session != self.session {
            return Err(InteropError::StaleSurface(frame.surface.handle));
        }
        if frame.codec.api != self.api || !frame.codec.is_hardware_surface() {
            return Err(InteropError::InvalidFrame(format!(
                "{} frame offered to {} interop",
                frame.codec, self.interop_type
            )));
        }
        if frame.width == 0
            || frame.height == 0
            || frame.width > self.max_texture_size
            || frame.height > self.max_texture_size
        {
            return Err(InteropError::InvalidFrame(format!(
                "{}x{} outside 1..={}",
                frame.width, frame.height, self.max_texture_size
            )));
        }
        if !self.provider.is_live(&frame.surface) {
            return Err(InteropError::StaleSurface(frame.surface.handle));
        }
        Ok(())
    }

    fn acquire_locked(
        &self,
        state: &mut InstanceState<B>,
        frame: &VideoFrame,
        colour: &ColourSpace,
        scan: ScanType,
    ) -> Result<TextureSet> {
        let InstanceState {
            backend,
            cache,
            throttle,
            stats,
        } = state;
        let handle = frame.surface.handle;
        let key = CacheKey::for_frame(frame, colour);
        stats.acquires += 1;

        let hit = cache
            .lookup(&frame.surface, &key, |_, stale| {
                backend.release(stale);
                stats.evictions += 1;
            })
            .is_some();

        let now = Instant::now();
        if !throttle.allow(handle, now) {
            stats.throttled += 1;
            return Err(InteropError::ImportFailed(format!(
                "{} throttled after repeated failures",
                handle
            )));
        }

        if hit {
            stats.cache_hits += 1;
            tracing::trace!("Cache hit for {}", handle);
        } else {
            tracing::debug!("Cache miss for {}, importing", handle);
            let imported = match backend.import(frame, colour, scan) {
                Err(e) if e.is_resource_exhaustion() => {
                    let released = cache.clear(|_, surface| backend.release(surface));
                    stats.evictions += released as u64;
                    tracing::warn!(
                        "{}: released {} cached surfaces, retrying import of {}",
                        e,
                        released,
                        handle
                    );
                    backend.import(frame, colour, scan)
                }
                other => other,
            };

            let cached = match imported {
                Ok(cached) => cached,
                Err(e) => {
                    note_failure(throttle, stats, "Import", handle, now, &e);
                    return Err(e);
                }
            };

            stats.imports += 1;
            cache.insert(frame.surface, key, cached, |_, evicted| {
                backend.release(evicted);
                stats.evictions += 1;
            });
        }

        let Some(cached) = cache.get_mut(handle) else {
            return Err(InteropError::ImportFailed(format!("{} vanished from cache", handle)));
        };
        if let Err(e) = backend.refresh(frame, colour, scan, cached) {
            note_failure(throttle, stats, "Refresh", handle, now, &e);
            return Err(e);
        }
        throttle.record_success(handle);

        if self.interop_type.is_zero_copy() {
            stats.zero_copy += 1;
        }
        Ok(cached.textures.clone().with_field(scan.field()))
    }
}

/// Count a failed native attempt and log it at the throttle's frequency.
fn note_failure(
    throttle: &mut ImportThrottle,
    stats: &mut InteropStats,
    what: &str,
    handle: SurfaceHandle,
    now: Instant,
    error: &InteropError,
) {
    stats.import_failures += 1;
    if let FailureLog::Log { suppressed } = throttle.record_failure(handle, now) {
        tracing::warn!(
            "{} of {} failed: {} ({} similar failures suppressed)",
            what,
            handle,
            error,
            suppressed
        );
    }
}

impl<B: InteropBackend> Interop for InteropInstance<B> {
    fn interop_type(&self) -> InteropType {
        self.interop_type
    }

    fn acquire(&self, frame: &VideoFrame, colour: &ColourSpace, scan: ScanType) -> TextureSet {
        let _enter = self.span.enter();
        match self.try_acquire(frame, colour, scan) {
            Ok(set) => set,
            Err(InteropError::TornDown) => {
                tracing::debug!("Acquire of {} rejected after teardown", frame.surface.handle);
                TextureSet::empty()
            }
            Err(e) => {
                tracing::trace!("Acquire of {} produced no textures: {}", frame.surface.handle, e);
                TextureSet::empty()
            }
        }
    }

    fn evict_stale(&self, live: &LiveSurfaces) {
        if self.torn_down.load(Ordering::Acquire) {
            return;
        }
        *self.pending_live.lock() = Some(live.clone());

        // The render thread applies the pending set itself if it holds the lock.
        self.apply_pending();
    }

    fn teardown(&self) -> Result<()> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _enter = self.span.enter();

        let mut state = self.state.lock();
        let InstanceState {
            backend,
            cache,
            throttle,
            stats,
        } = &mut *state;
        let released = cache.clear(|_, surface| backend.release(surface));
        stats.evictions += released as u64;
        throttle.clear();
        backend.teardown();
        self.pending_live.lock().take();

        tracing::info!(
            "{} interop torn down, released {} cached surfaces",
            self.interop_type,
            released
        );
        Ok(())
    }

    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    fn cached_surfaces(&self) -> usize {
        self.state.lock().cache.len()
    }

    fn stats(&self) -> InteropStats {
        self.state.lock().stats
    }
}

impl<B: InteropBackend> Drop for InteropInstance<B> {
    fn drop(&mut self) {
        if !self.is_torn_down() {
            if let Err(e) = Interop::teardown(self) {
                tracing::error!("{} interop teardown on drop failed: {}", self.interop_type, e);
            }
        }
    }
}

impl<B: InteropBackend> std::fmt::Debug for InteropInstance<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteropInstance")
            .field("interop_type", &self.interop_type)
            .field("session", &self.session)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
