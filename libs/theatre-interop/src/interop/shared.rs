// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared ownership of an interop across the decode and render paths.

use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::instance::Interop;
use super::{InteropStats, InteropType, TextureSet};
use crate::colour::ColourSpace;
use crate::error::{InteropError, Result};
use crate::frame::{LiveSurfaces, ScanType, VideoFrame};

#[derive(Debug, Default)]
struct LeaseState {
    active: usize,
    closing: bool,
}

struct SharedInner {
    interop: Box<dyn Interop>,
    lease: Mutex<LeaseState>,
    drained: Condvar,
    drain_timeout: Duration,
}

impl SharedInner {
    fn release_lease(&self) {
        let mut state = self.lease.lock();
        state.active = state.active.saturating_sub(1);
        if state.active == 0 {
            self.drained.notify_all();
        }
    }
}

impl Drop for SharedInner {
    fn drop(&mut self) {
        if !self.interop.is_torn_down() {
            tracing::debug!("Last reference to {} interop released", self.interop.interop_type());
            if let Err(e) = self.interop.teardown() {
                tracing::error!("Interop teardown on release failed: {}", e);
            }
        }
    }
}

/// Reference-counted interop handle.
///
/// The decode side keeps one clone for format negotiation and eviction; the
/// render side takes a [`InteropLease`] around each acquire-and-draw.
/// [`teardown`](SharedInterop::teardown) waits for outstanding leases to be
/// returned before releasing native resources.
#[derive(Clone)]
pub struct SharedInterop {
    inner: Arc<SharedInner>,
}

impl SharedInterop {
    pub fn new(interop: Box<dyn Interop>, drain_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                interop,
                lease: Mutex::new(LeaseState::default()),
                drained: Condvar::new(),
                drain_timeout,
            }),
        }
    }

    pub fn interop_type(&self) -> InteropType {
        self.inner.interop.interop_type()
    }

    /// Start using the interop. `None` once teardown has begun.
    pub fn lease(&self) -> Option<InteropLease> {
        let mut state = self.inner.lease.lock();
        if state.closing || self.inner.interop.is_torn_down() {
            return None;
        }
        state.active += 1;
        Some(InteropLease {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Lease, acquire and return the lease in one step.
    pub fn acquire(&self, frame: &VideoFrame, colour: &ColourSpace, scan: ScanType) -> TextureSet {
        match self.lease() {
            Some(lease) => lease.acquire(frame, colour, scan),
            None => TextureSet::empty(),
        }
    }

    pub fn evict_stale(&self, live: &LiveSurfaces) {
        self.inner.interop.evict_stale(live);
    }

    pub fn stats(&self) -> InteropStats {
        self.inner.interop.stats()
    }

    pub fn cached_surfaces(&self) -> usize {
        self.inner.interop.cached_surfaces()
    }

    /// Clones of this handle still alive, leases included.
    pub fn references(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn active_leases(&self) -> usize {
        self.inner.lease.lock().active
    }

    pub fn is_closing(&self) -> bool {
        self.inner.lease.lock().closing || self.inner.interop.is_torn_down()
    }

    /// Stop new leases, wait for active ones, then tear the interop down.
    ///
    /// On [`InteropError::DrainTimeout`] the interop stays closed to new
    /// leases and is torn down when the last reference goes away.
    pub fn teardown(&self) -> Result<()> {
        let deadline = Instant::now() + self.inner.drain_timeout;
        let mut state = self.inner.lease.lock();
        state.closing = true;

        while state.active > 0 {
            let waited = self.inner.drained.wait_until(&mut state, deadline);
            if waited.timed_out() && state.active > 0 {
                let ms = self.inner.drain_timeout.as_millis() as u64;
                tracing::error!(
                    "{} interop teardown: {} leases still active after {}ms",
                    self.interop_type(),
                    state.active,
                    ms
                );
                return Err(InteropError::DrainTimeout(ms));
            }
        }
        drop(state);

        self.inner.interop.teardown()
    }
}

impl std::fmt::Debug for SharedInterop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInterop")
            .field("interop_type", &self.interop_type())
            .field("references", &self.references())
            .field("active_leases", &self.active_leases())
            .finish()
    }
}

/// Permission to use the interop for one draw. Returned on drop.
pub struct InteropLease {
    inner: Arc<SharedInner>,
}

impl Deref for InteropLease {
    type Target = dyn Interop;

    fn deref(&self) -> &Self::Target {
        self.inner.interop.as_ref()
    }
}

impl Drop for InteropLease {
    fn drop(&mut self) {
        self.inner.release_lease();
    }
}

impl std::fmt::Debug for InteropLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteropLease")
            .field("interop_type", &self.inner.interop.interop_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Counts native work; no real resources.
    #[derive(Default)]
    struct CountingInterop {
        torn_down: std::sync::atomic::AtomicBool,
        teardowns: Arc<AtomicU32>,
    }

    impl Interop for CountingInterop {
        fn interop_type(&self) -> InteropType {
            InteropType::Vdpau
        }
        fn acquire(&self, _: &VideoFrame, _: &ColourSpace, _: ScanType) -> TextureSet {
            TextureSet::empty()
        }
        fn evict_stale(&self, _: &LiveSurfaces) {}
        fn teardown(&self) -> Result<()> {
            if !self.torn_down.swap(true, Ordering::SeqCst) {
                self.teardowns.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
        fn is_torn_down(&self) -> bool {
            self.torn_down.load(Ordering::SeqCst)
        }
        fn cached_surfaces(&self) -> usize {
            0
        }
        fn stats(&self) -> InteropStats {
            InteropStats::default()
        }
    }

    fn shared(timeout_ms: u64) -> (SharedInterop, Arc<AtomicU32>) {
        let teardowns = Arc::new(AtomicU32::new(0));
        let interop = CountingInterop {
            teardowns: teardowns.clone(),
            ..Default::default()
        };
        (
            SharedInterop::new(Box::new(interop), Duration::from_millis(timeout_ms)),
            teardowns,
        )
    }

    #[test]
    fn test_last_reference_tears_down() {
        let (a, teardowns) = shared(100);
        let b = a.clone();
        assert_eq!(a.references(), 2);
        drop(a);
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_leases_after_teardown() {
        let (shared, teardowns) = shared(100);
        shared.teardown().unwrap();
        assert!(shared.lease().is_none());
        assert!(shared.is_closing());
        shared.teardown().unwrap();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drain_timeout_with_held_lease() {
        let (shared, teardowns) = shared(20);
        let lease = shared.lease().unwrap();
        assert!(matches!(shared.teardown(), Err(InteropError::DrainTimeout(20))));
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        assert!(shared.lease().is_none());

        drop(lease);
        shared.teardown().unwrap();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_waits_for_lease_on_other_thread() {
        let (shared, teardowns) = shared(2000);
        let lease = shared.lease().unwrap();
        let (started_tx, started_rx) = crossbeam_channel::bounded(0);

        let render = std::thread::spawn(move || {
            let _ = started_tx.send(());
            std::thread::sleep(Duration::from_millis(30));
            assert!(!lease.is_torn_down());
            drop(lease);
        });
        started_rx.recv().unwrap();
        shared.teardown().unwrap();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        render.join().unwrap();
    }
}
