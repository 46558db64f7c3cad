// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The closed set of decode-surface → texture interop mechanisms.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::DecodeApi;

/// Interop mechanism chosen for a stream.
///
/// Exactly one is selected per active stream and it never changes for the
/// stream's lifetime; switching requires a new interop instance. Logic must
/// match on the variant, never on [`InteropType::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum InteropType {
    #[serde(rename = "unsupported")]
    Unsupported = 0,
    /// VAAPI surface copied into a GL texture through GLX.
    #[serde(rename = "vaapi-glx-copy")]
    VaapiGlxCopy = 1,
    /// VAAPI surface rendered into an X pixmap bound as a GL texture.
    #[serde(rename = "vaapi-glx-pixmap")]
    VaapiGlxPixmap = 2,
    /// VAAPI surface exported as DMA-BUF and imported through EGL.
    #[serde(rename = "vaapi-egl-drm")]
    VaapiEglDrm = 3,
    /// VideoToolbox pixel buffer through the CoreVideo OpenGL texture cache.
    #[serde(rename = "vtb-opengl")]
    VtbOpenGl = 4,
    /// VideoToolbox IOSurface bound as a rectangle texture.
    #[serde(rename = "vtb-surface")]
    VtbSurface = 5,
    /// Android MediaCodec output rendered into a SurfaceTexture.
    #[serde(rename = "mediacodec")]
    MediaCodec = 6,
    /// VDPAU output surface registered through NV_vdpau_interop.
    #[serde(rename = "vdpau")]
    Vdpau = 7,
    /// NVDEC CUDA surface mapped through CUDA/GL interop.
    #[serde(rename = "nvdec")]
    Nvdec = 8,
}

impl InteropType {
    /// Every variant, in id order.
    pub const ALL: [InteropType; 9] = [
        Self::Unsupported,
        Self::VaapiGlxCopy,
        Self::VaapiGlxPixmap,
        Self::VaapiEglDrm,
        Self::VtbOpenGl,
        Self::VtbSurface,
        Self::MediaCodec,
        Self::Vdpau,
        Self::Nvdec,
    ];

    /// Stable numeric id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Human-readable name for logs and UI.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsupported => "Unsupported",
            Self::VaapiGlxCopy => "VAAPI GLX Copy",
            Self::VaapiGlxPixmap => "VAAPI GLX Pixmap",
            Self::VaapiEglDrm => "VAAPI DRM",
            Self::VtbOpenGl => "VideoToolbox OpenGL",
            Self::VtbSurface => "VideoToolbox Surface",
            Self::MediaCodec => "MediaCodec Surface",
            Self::Vdpau => "VDPAU",
            Self::Nvdec => "NVDEC",
        }
    }

    /// Short name used in configuration files and environment overrides.
    pub fn config_name(self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::VaapiGlxCopy => "vaapi-glx-copy",
            Self::VaapiGlxPixmap => "vaapi-glx-pixmap",
            Self::VaapiEglDrm => "vaapi-egl-drm",
            Self::VtbOpenGl => "vtb-opengl",
            Self::VtbSurface => "vtb-surface",
            Self::MediaCodec => "mediacodec",
            Self::Vdpau => "vdpau",
            Self::Nvdec => "nvdec",
        }
    }

    /// Whether frames reach the renderer without passing through system memory.
    pub fn is_zero_copy(self) -> bool {
        !matches!(self, Self::Unsupported | Self::VaapiGlxCopy)
    }

    /// Decode API whose surfaces this interop consumes.
    pub fn decode_api(self) -> Option<DecodeApi> {
        match self {
            Self::Unsupported => None,
            Self::VaapiGlxCopy | Self::VaapiGlxPixmap | Self::VaapiEglDrm => Some(DecodeApi::Vaapi),
            Self::VtbOpenGl | Self::VtbSurface => Some(DecodeApi::VideoToolbox),
            Self::MediaCodec => Some(DecodeApi::MediaCodec),
            Self::Vdpau => Some(DecodeApi::Vdpau),
            Self::Nvdec => Some(DecodeApi::Nvdec),
        }
    }

    /// Renderer that displays frames produced through this interop.
    pub fn renderer_name(self) -> Option<&'static str> {
        match self {
            Self::Unsupported => None,
            Self::VaapiGlxCopy => Some("opengl-hw-copy"),
            _ => Some("opengl-hw"),
        }
    }
}

impl FromStr for InteropType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| {
                t.config_name().eq_ignore_ascii_case(wanted) || t.as_str().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|t| t.config_name()).collect();
                format!(
                    "Unknown interop type '{}'. Valid values: {}",
                    s,
                    valid.join(", ")
                )
            })
    }
}

impl std::fmt::Display for InteropType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
