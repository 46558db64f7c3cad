// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The graphics-context surface the interop layer consumes.

use std::time::Duration;

use crate::error::Result;
use crate::interop::{PlaneFormat, TextureId, TextureTarget};

/// Descriptor for creating an empty texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub target: TextureTarget,
    pub format: PlaneFormat,
    pub width: u32,
    pub height: u32,
}

impl TextureDescriptor {
    pub fn new(width: u32, height: u32, format: PlaneFormat) -> Self {
        Self {
            target: TextureTarget::Texture2D,
            format,
            width,
            height,
        }
    }

    pub fn with_target(mut self, target: TextureTarget) -> Self {
        self.target = target;
        self
    }
}

/// Build a DRM fourcc code.
pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// DRM fourcc codes for single-plane imports.
pub mod drm_formats {
    use super::fourcc;

    pub const DRM_FORMAT_R8: u32 = fourcc(b'R', b'8', b' ', b' ');
    pub const DRM_FORMAT_GR88: u32 = fourcc(b'G', b'R', b'8', b'8');
    pub const DRM_FORMAT_R16: u32 = fourcc(b'R', b'1', b'6', b' ');
    pub const DRM_FORMAT_GR1616: u32 = fourcc(b'G', b'R', b'3', b'2');
    pub const DRM_FORMAT_ABGR8888: u32 = fourcc(b'A', b'B', b'2', b'4');
}

impl PlaneFormat {
    /// DRM fourcc used when importing a plane of this format.
    pub fn drm_fourcc(&self) -> u32 {
        match self {
            Self::R8 => drm_formats::DRM_FORMAT_R8,
            Self::Rg8 => drm_formats::DRM_FORMAT_GR88,
            Self::R16 => drm_formats::DRM_FORMAT_R16,
            Self::Rg16 => drm_formats::DRM_FORMAT_GR1616,
            Self::Rgba8 => drm_formats::DRM_FORMAT_ABGR8888,
        }
    }
}

/// Single-plane DMA-BUF description for `EGL_EXT_image_dma_buf_import`.
///
/// The fd stays owned by whoever exported it; the context only borrows it
/// for the duration of the import call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaBufImage {
    pub fd: i32,
    pub fourcc: u32,
    pub modifier: u64,
    pub offset: u32,
    pub pitch: u32,
    pub width: u32,
    pub height: u32,
}

/// Native fence object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    TimedOut,
}

/// Graphics context as seen by the interop layer.
///
/// The context is single-owner: every method other than
/// [`is_current_thread`](RenderContext::is_current_thread) and
/// [`max_texture_size`](RenderContext::max_texture_size) must be called
/// on the thread that owns it. Callers that may run elsewhere go through
/// [`ContextDispatcher`](super::ContextDispatcher).
pub trait RenderContext: Send + Sync {
    /// Whether the calling thread owns the context.
    fn is_current_thread(&self) -> bool;

    /// Largest texture dimension the context accepts. Queried once at
    /// context creation, so callable from any thread.
    fn max_texture_size(&self) -> u32;

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<TextureId>;

    /// Import a DMA-BUF plane as a texture without copying it.
    fn import_dma_buf(&self, image: &DmaBufImage, target: TextureTarget) -> Result<TextureId>;

    fn delete_texture(&self, texture: TextureId);

    /// Insert a fence after all commands issued so far.
    fn insert_fence(&self) -> Result<FenceId>;

    /// Block until the fence signals or `timeout` elapses.
    fn wait_fence(&self, fence: FenceId, timeout: Duration) -> FenceStatus;

    fn delete_fence(&self, fence: FenceId);
}
