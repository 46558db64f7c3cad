// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Interop selection policy.
//!
//! Selection is a pure function of the codec descriptor and the host
//! capabilities. It never touches a graphics context, so it can run before
//! one exists.

use super::capability::{HostCapabilities, Windowing};
use super::InteropType;
use crate::codec::{CodecDescriptor, DecodeApi};
use crate::config::InteropConfig;

/// Candidate interops per decode API, most preferred first.
///
/// Zero-copy mechanisms come before copying ones. On X11 the GLX pixmap
/// path wins over EGL DRM; elsewhere the windowing gate leaves EGL DRM.
fn candidates(api: DecodeApi) -> &'static [InteropType] {
    match api {
        DecodeApi::Vaapi => &[
            InteropType::VaapiGlxPixmap,
            InteropType::VaapiEglDrm,
            InteropType::VaapiGlxCopy,
        ],
        DecodeApi::VideoToolbox => &[InteropType::VtbSurface, InteropType::VtbOpenGl],
        DecodeApi::MediaCodec => &[InteropType::MediaCodec],
        DecodeApi::Vdpau => &[InteropType::Vdpau],
        DecodeApi::Nvdec => &[InteropType::Nvdec],
        DecodeApi::Software | DecodeApi::V4l2 | DecodeApi::Dxva2 => &[],
    }
}

/// Whether `interop` can run under `windowing`.
pub fn windowing_allows(interop: InteropType, windowing: Windowing) -> bool {
    use Windowing::*;
    match interop {
        InteropType::Unsupported => false,
        InteropType::VaapiGlxCopy | InteropType::VaapiGlxPixmap | InteropType::Vdpau => {
            windowing == X11
        }
        InteropType::VaapiEglDrm => matches!(windowing, X11 | Wayland | Eglfs),
        InteropType::VtbOpenGl | InteropType::VtbSurface => windowing == Cocoa,
        InteropType::MediaCodec => windowing == Android,
        InteropType::Nvdec => matches!(windowing, X11 | Wayland | Eglfs | Windows),
    }
}

/// Chooses the interop for a stream.
#[derive(Debug, Clone, Copy)]
pub struct InteropSelector {
    capabilities: HostCapabilities,
}

impl InteropSelector {
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self { capabilities }
    }

    /// Selector honouring `config.disabled_interops`.
    pub fn with_config(capabilities: HostCapabilities, config: &InteropConfig) -> Self {
        Self::new(capabilities.without(&config.disabled_interops))
    }

    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    /// Every interop able to carry `codec` on this host, best first.
    ///
    /// Empty for software and copy-back codecs.
    pub fn allowed_types(&self, codec: &CodecDescriptor) -> Vec<InteropType> {
        if !codec.is_hardware_surface() {
            return Vec::new();
        }
        candidates(codec.api)
            .iter()
            .copied()
            .filter(|t| {
                self.capabilities.interops.supports(*t)
                    && windowing_allows(*t, self.capabilities.windowing)
            })
            .collect()
    }

    /// Best interop for `codec`, or [`InteropType::Unsupported`].
    pub fn interop_type(&self, codec: &CodecDescriptor) -> InteropType {
        self.allowed_types(codec)
            .first()
            .copied()
            .unwrap_or(InteropType::Unsupported)
    }

    /// [`interop_type`](Self::interop_type), logging the decision.
    pub fn select(&self, codec: &CodecDescriptor) -> InteropType {
        let interop = self.interop_type(codec);
        if interop == InteropType::Unsupported {
            tracing::info!("No hardware interop for {}", codec);
        } else {
            tracing::info!("Selected {} interop for {}", interop, codec);
        }
        interop
    }

    /// Renderer names able to display `codec`, best first, without repeats.
    pub fn allowed_renderers(&self, codec: &CodecDescriptor) -> Vec<String> {
        let mut renderers: Vec<String> = Vec::new();
        for name in self
            .allowed_types(codec)
            .into_iter()
            .filter_map(InteropType::renderer_name)
        {
            if !renderers.iter().any(|r| r == name) {
                renderers.push(name.to_string());
            }
        }
        renderers
    }
}
