// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Decode-surface → texture interop.

mod capability;
mod instance;
mod interop_type;
mod selector;
mod shared;
mod stats;
mod texture;
mod texture_cache;
mod throttle;
pub mod vaapi_drm;
pub mod vdpau;

use std::sync::Arc;

pub use capability::{CachedProbe, HostCapabilities, InteropProbe, InteropSupport, Windowing};
pub use instance::{Interop, InteropBackend, InteropInstance};
pub use interop_type::InteropType;
pub use selector::{InteropSelector, windowing_allows};
pub use shared::{InteropLease, SharedInterop};
pub use stats::InteropStats;
pub use texture::{
    CropRect, MAX_PLANES, PlaneFormat, TextureId, TextureSet, TextureTarget, TooManyPlanes,
    VideoTexture, gl_constants,
};
pub use texture_cache::{CacheKey, CachedSurface, TextureCache};
pub use throttle::{FailureLog, ImportThrottle};
pub use vaapi_drm::{PrimeLayer, PrimeSurface, VaapiDisplay, VaapiDrmInterop};
pub use vdpau::{VdpauGlInterop, VdpauHelper, VdpauInterop};

use crate::colour::ColourSpace;
use crate::config::InteropConfig;
use crate::error::{InteropError, Result};
use crate::frame::{DecodeSurfaceProvider, ScanType, VideoFrame};
use crate::render::ContextDispatcher;

/// Native device handed over by the decode context bootstrap.
#[derive(Clone)]
pub enum BackendDevice {
    VaapiDrm(Arc<dyn VaapiDisplay>),
    Vdpau {
        helper: VdpauHelper,
        gl: Arc<dyn VdpauGlInterop>,
    },
}

impl BackendDevice {
    fn name(&self) -> &'static str {
        match self {
            Self::VaapiDrm(_) => "VAAPI",
            Self::Vdpau { .. } => "VDPAU",
        }
    }
}

impl std::fmt::Debug for BackendDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Create the interop for a stream.
///
/// Called once per stream, after [`InteropSelector::select`]. An interop
/// type without a backend for `device` is reported as
/// [`InteropError::Unsupported`].
pub fn create_interop(
    interop_type: InteropType,
    device: BackendDevice,
    dispatcher: &ContextDispatcher,
    provider: Arc<dyn DecodeSurfaceProvider>,
    config: &InteropConfig,
) -> Result<SharedInterop> {
    config.validate()?;
    if config.is_disabled(interop_type) {
        return Err(InteropError::Unsupported(format!(
            "{} is disabled by configuration",
            interop_type
        )));
    }

    match (interop_type, device) {
        (InteropType::VaapiEglDrm, BackendDevice::VaapiDrm(display)) => {
            let backend = VaapiDrmInterop::new(display, dispatcher.clone(), config);
            share(backend, dispatcher, provider, config)
        }
        (InteropType::Vdpau, BackendDevice::Vdpau { helper, gl }) => {
            let backend = VdpauInterop::new(helper, gl, dispatcher.clone());
            share(backend, dispatcher, provider, config)
        }
        (interop_type, device) => {
            tracing::info!("{} interop is not available with a {} device", interop_type, device.name());
            Err(InteropError::Unsupported(format!(
                "{} interop with a {} device",
                interop_type,
                device.name()
            )))
        }
    }
}

fn share<B: InteropBackend>(
    backend: B,
    dispatcher: &ContextDispatcher,
    provider: Arc<dyn DecodeSurfaceProvider>,
    config: &InteropConfig,
) -> Result<SharedInterop> {
    let instance = InteropInstance::new(backend, dispatcher, provider, config)?;
    Ok(SharedInterop::new(Box::new(instance), config.drain_timeout()))
}

/// Textures for `frame` through the interop the decoder attached to it.
///
/// Frames without an interop, and frames that are not in hardware surfaces,
/// yield an empty set.
pub fn retrieve(frame: &VideoFrame, colour: &ColourSpace, scan: ScanType) -> TextureSet {
    if !frame.codec.is_hardware_surface() {
        return TextureSet::empty();
    }
    match &frame.interop {
        Some(interop) => interop.acquire(frame, colour, scan),
        None => {
            tracing::trace!("{} frame {} carries no interop", frame.codec, frame.surface.handle);
            TextureSet::empty()
        }
    }
}
