// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Decoded-frame descriptors handed over by the decode-surface provider.

use std::collections::HashMap;

use crate::codec::CodecDescriptor;
use crate::interop::{CropRect, PlaneFormat, SharedInterop};

/// Opaque decode-surface handle (VASurfaceID, VdpVideoSurface, CVPixelBufferRef…).
///
/// Owned by the provider's surface pool. Equality and hashing are by value;
/// values are recycled by the pool, so identity across recycling is
/// established with [`DecodeSurface::generation`], never by value alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for SurfaceHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifies one decoder session; a new session starts on every
/// format/backend change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeSessionId(pub u64);

/// A surface as the pool currently knows it: handle plus the pool's
/// allocation generation for that handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeSurface {
    pub handle: SurfaceHandle,
    pub generation: u64,
}

impl DecodeSurface {
    pub fn new(handle: impl Into<SurfaceHandle>, generation: u64) -> Self {
        Self {
            handle: handle.into(),
            generation,
        }
    }
}

/// Which field of an interlaced frame is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Top,
    Bottom,
}

/// Scan mode requested for the current display pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanType {
    #[default]
    Progressive,
    InterlacedTop,
    InterlacedBottom,
}

impl ScanType {
    pub fn is_interlaced(&self) -> bool {
        !matches!(self, Self::Progressive)
    }

    pub fn field(&self) -> Option<Field> {
        match self {
            Self::Progressive => None,
            Self::InterlacedTop => Some(Field::Top),
            Self::InterlacedBottom => Some(Field::Bottom),
        }
    }
}

/// Memory layout of a decode surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// 8-bit 4:2:0, Y plane + interleaved CbCr plane.
    Nv12,
    /// 10-bit 4:2:0 in 16-bit containers, NV12 layout.
    P010,
    /// 8-bit 4:2:0, three planes.
    Yuv420p,
    /// Packed 8-bit RGBA (post-processed output).
    Rgba8,
}

impl SurfaceFormat {
    pub fn plane_count(&self) -> usize {
        match self {
            Self::Nv12 | Self::P010 => 2,
            Self::Yuv420p => 3,
            Self::Rgba8 => 1,
        }
    }

    /// Texture format of plane `index`.
    pub fn plane_format(&self, index: usize) -> Option<PlaneFormat> {
        match (self, index) {
            (Self::Nv12, 0) => Some(PlaneFormat::R8),
            (Self::Nv12, 1) => Some(PlaneFormat::Rg8),
            (Self::P010, 0) => Some(PlaneFormat::R16),
            (Self::P010, 1) => Some(PlaneFormat::Rg16),
            (Self::Yuv420p, 0..=2) => Some(PlaneFormat::R8),
            (Self::Rgba8, 0) => Some(PlaneFormat::Rgba8),
            _ => None,
        }
    }

    /// Pixel dimensions of plane `index` for a `width`×`height` frame.
    pub fn plane_size(&self, index: usize, width: u32, height: u32) -> (u32, u32) {
        match (self, index) {
            (Self::Rgba8, _) | (_, 0) => (width, height),
            _ => (width.div_ceil(2), height.div_ceil(2)),
        }
    }
}

/// One decoded frame as handed from the decode path to the render path.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub session: DecodeSessionId,
    pub surface: DecodeSurface,
    pub codec: CodecDescriptor,
    pub format: SurfaceFormat,
    pub width: u32,
    pub height: u32,
    /// Visible region; `None` means the full frame.
    pub crop: Option<CropRect>,
    /// Interop the decoder attached for this stream, if any.
    pub interop: Option<SharedInterop>,
}

impl VideoFrame {
    pub fn new(
        session: DecodeSessionId,
        surface: DecodeSurface,
        codec: CodecDescriptor,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            session,
            surface,
            codec,
            format,
            width,
            height,
            crop: None,
            interop: None,
        }
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_interop(mut self, interop: SharedInterop) -> Self {
        self.interop = Some(interop);
        self
    }

    /// Effective crop, clamped to the frame.
    pub fn visible_rect(&self) -> CropRect {
        let full = CropRect::full(self.width, self.height);
        self.crop.map(|c| c.clamp_to(self.width, self.height)).unwrap_or(full)
    }
}

/// Snapshot of the surfaces a provider currently keeps alive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSurfaces {
    generations: HashMap<SurfaceHandle, u64>,
}

impl LiveSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, surface: DecodeSurface) {
        self.generations.insert(surface.handle, surface.generation);
    }

    /// Live with the same generation (not recycled since).
    pub fn contains(&self, surface: &DecodeSurface) -> bool {
        self.generations.get(&surface.handle) == Some(&surface.generation)
    }

    pub fn contains_handle(&self, handle: SurfaceHandle) -> bool {
        self.generations.contains_key(&handle)
    }

    pub fn generation(&self, handle: SurfaceHandle) -> Option<u64> {
        self.generations.get(&handle).copied()
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DecodeSurface> + '_ {
        self.generations
            .iter()
            .map(|(handle, generation)| DecodeSurface::new(*handle, *generation))
    }
}

impl FromIterator<DecodeSurface> for LiveSurfaces {
    fn from_iter<I: IntoIterator<Item = DecodeSurface>>(iter: I) -> Self {
        let mut live = Self::new();
        for surface in iter {
            live.insert(surface);
        }
        live
    }
}

/// The decoder side of the hand-off. Implemented outside this crate by
/// whatever owns the hardware surface pool.
pub trait DecodeSurfaceProvider: Send + Sync {
    /// Session the pool belongs to.
    fn session(&self) -> DecodeSessionId;

    /// Surfaces currently owned by the pool.
    fn live_surfaces(&self) -> LiveSurfaces;

    /// Whether `surface` is still live and has not been recycled.
    fn is_live(&self, surface: &DecodeSurface) -> bool {
        self.live_surfaces().contains(surface)
    }
}
