// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Host interop capabilities, probed once per process.

use std::sync::OnceLock;

use bitflags::bitflags;

use super::InteropType;

bitflags! {
    /// Interop mechanisms the host can run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InteropSupport: u16 {
        const VAAPI_GLX_COPY = 1 << 1;
        const VAAPI_GLX_PIXMAP = 1 << 2;
        const VAAPI_EGL_DRM = 1 << 3;
        const VTB_OPENGL = 1 << 4;
        const VTB_SURFACE = 1 << 5;
        const MEDIACODEC = 1 << 6;
        const VDPAU = 1 << 7;
        const NVDEC = 1 << 8;
    }
}

impl InteropSupport {
    /// Flag for `interop`; empty for [`InteropType::Unsupported`].
    pub fn flag(interop: InteropType) -> Self {
        match interop {
            InteropType::Unsupported => Self::empty(),
            InteropType::VaapiGlxCopy => Self::VAAPI_GLX_COPY,
            InteropType::VaapiGlxPixmap => Self::VAAPI_GLX_PIXMAP,
            InteropType::VaapiEglDrm => Self::VAAPI_EGL_DRM,
            InteropType::VtbOpenGl => Self::VTB_OPENGL,
            InteropType::VtbSurface => Self::VTB_SURFACE,
            InteropType::MediaCodec => Self::MEDIACODEC,
            InteropType::Vdpau => Self::VDPAU,
            InteropType::Nvdec => Self::NVDEC,
        }
    }

    pub fn supports(&self, interop: InteropType) -> bool {
        let flag = Self::flag(interop);
        !flag.is_empty() && self.contains(flag)
    }

    pub fn from_types<I: IntoIterator<Item = InteropType>>(types: I) -> Self {
        types
            .into_iter()
            .fold(Self::empty(), |acc, t| acc | Self::flag(t))
    }

    /// Supported types in id order.
    pub fn types(&self) -> Vec<InteropType> {
        InteropType::ALL
            .iter()
            .copied()
            .filter(|t| self.supports(*t))
            .collect()
    }
}

/// Window system the renderer runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Windowing {
    X11,
    Wayland,
    /// EGL on a bare KMS/DRM device.
    Eglfs,
    Cocoa,
    Android,
    Windows,
    Headless,
}

/// What the host offers: window system plus runnable interops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub windowing: Windowing,
    pub interops: InteropSupport,
}

static HOST_CAPABILITIES: OnceLock<HostCapabilities> = OnceLock::new();

impl HostCapabilities {
    pub fn new(windowing: Windowing, interops: InteropSupport) -> Self {
        Self {
            windowing,
            interops,
        }
    }

    /// No windowing, no hardware interop.
    pub fn headless() -> Self {
        Self::new(Windowing::Headless, InteropSupport::empty())
    }

    /// Probe every interop type through `probe`.
    pub fn probe(probe: &dyn InteropProbe) -> Self {
        let windowing = probe.windowing();
        let interops = InteropSupport::from_types(
            InteropType::ALL
                .iter()
                .copied()
                .filter(|t| *t != InteropType::Unsupported && probe.is_available(*t)),
        );
        tracing::info!(
            "Interop capabilities: windowing={:?} available={:?}",
            windowing,
            interops.types()
        );
        Self::new(windowing, interops)
    }

    /// Copy with `disabled` removed.
    pub fn without(&self, disabled: &[InteropType]) -> Self {
        let removed = InteropSupport::from_types(disabled.iter().copied());
        Self::new(self.windowing, self.interops - removed)
    }

    /// Process-wide capabilities, probing with `probe` on first use.
    ///
    /// Later calls return the first result regardless of `probe`.
    pub fn global_or_probe<F>(probe: F) -> &'static HostCapabilities
    where
        F: FnOnce() -> HostCapabilities,
    {
        HOST_CAPABILITIES.get_or_init(probe)
    }

    /// Process-wide capabilities, if already probed.
    pub fn global() -> Option<&'static HostCapabilities> {
        HOST_CAPABILITIES.get()
    }
}

/// Platform hook answering "can this interop run here?".
pub trait InteropProbe {
    fn windowing(&self) -> Windowing;

    fn is_available(&self, interop: InteropType) -> bool;
}

/// A boolean capability probed at most once per process.
pub struct CachedProbe {
    name: &'static str,
    value: OnceLock<bool>,
}

impl CachedProbe {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: OnceLock::new(),
        }
    }

    /// Cached result, running `probe` on the first call only.
    pub fn get_or_probe<F>(&self, probe: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        *self.value.get_or_init(|| {
            let available = probe();
            tracing::info!("{} available: {}", self.name, available);
            available
        })
    }

    /// Cached result without probing.
    pub fn get(&self) -> Option<bool> {
        self.value.get().copied()
    }
}

impl std::fmt::Debug for CachedProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedProbe")
            .field("name", &self.name)
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_support_flags() {
        let support = InteropSupport::from_types([InteropType::VaapiEglDrm, InteropType::Vdpau]);
        assert!(support.supports(InteropType::VaapiEglDrm));
        assert!(!support.supports(InteropType::VaapiGlxCopy));
        assert!(!support.supports(InteropType::Unsupported));
        assert_eq!(support.types(), vec![InteropType::VaapiEglDrm, InteropType::Vdpau]);
    }

    #[test]
    fn test_without() {
        let caps = HostCapabilities::new(
            Windowing::X11,
            InteropSupport::VAAPI_EGL_DRM | InteropSupport::VAAPI_GLX_COPY,
        );
        let trimmed = caps.without(&[InteropType::VaapiEglDrm]);
        assert_eq!(trimmed.interops, InteropSupport::VAAPI_GLX_COPY);
        assert_eq!(trimmed.windowing, Windowing::X11);
    }

    struct Only(InteropType);

    impl InteropProbe for Only {
        fn windowing(&self) -> Windowing {
            Windowing::Wayland
        }
        fn is_available(&self, interop: InteropType) -> bool {
            interop == self.0
        }
    }

    #[test]
    fn test_probe_host() {
        let caps = HostCapabilities::probe(&Only(InteropType::Nvdec));
        assert_eq!(caps.windowing, Windowing::Wayland);
        assert_eq!(caps.interops, InteropSupport::NVDEC);
    }

    #[test]
    fn test_cached_probe_runs_once_across_threads() {
        static PROBE: CachedProbe = CachedProbe::new("test probe");
        let calls = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let calls = calls.clone();
                std::thread::spawn(move || {
                    PROBE.get_or_probe(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        true
                    })
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(PROBE.get(), Some(true));
    }

    // The only test touching the process-wide capabilities.
    #[test]
    fn test_global_capabilities_probed_once() {
        assert!(HostCapabilities::global().is_none());
        let calls = AtomicU32::new(0);

        let first = HostCapabilities::global_or_probe(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            HostCapabilities::probe(&Only(InteropType::VaapiEglDrm))
        });
        let second = HostCapabilities::global_or_probe(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            HostCapabilities::headless()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(std::ptr::eq(first, second));
        assert_eq!(second.interops, InteropSupport::VAAPI_EGL_DRM);
        assert_eq!(HostCapabilities::global().map(|caps| caps.windowing), Some(Windowing::Wayland));
    }
}
