// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use theatre_interop::interop::{PrimeLayer, PrimeSurface, VaapiDisplay};
use theatre_interop::render::drm_formats;
use theatre_interop::{InteropError, Result, SurfaceFormat, SurfaceHandle};

#[derive(Debug)]
struct DisplayState {
    format: SurfaceFormat,
    width: u32,
    height: u32,
    next_fd: i32,
    open_fds: HashSet<i32>,
    exports: u64,
    syncs: u64,
    failing_exports: u32,
    failing_syncs: u32,
}

/// VA display that exports surfaces as numbered fake fds.
#[derive(Debug)]
pub struct FakeVaapiDisplay {
    state: Mutex<DisplayState>,
}

impl FakeVaapiDisplay {
    /// Exports 1080p NV12 surfaces.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DisplayState {
                format: SurfaceFormat::Nv12,
                width: 1920,
                height: 1080,
                next_fd: 100,
                open_fds: HashSet::new(),
                exports: 0,
                syncs: 0,
                failing_exports: 0,
                failing_syncs: 0,
            }),
        })
    }

    pub fn set_surface_format(&self, format: SurfaceFormat, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.format = format;
        state.width = width;
        state.height = height;
    }

    pub fn fail_next_exports(&self, count: u32) {
        self.state.lock().failing_exports = count;
    }

    pub fn fail_next_syncs(&self, count: u32) {
        self.state.lock().failing_syncs = count;
    }

    pub fn exports(&self) -> u64 {
        self.state.lock().exports
    }

    pub fn syncs(&self) -> u64 {
        self.state.lock().syncs
    }

    /// DMA-BUF fds exported but not yet closed.
    pub fn open_fds(&self) -> usize {
        self.state.lock().open_fds.len()
    }
}

fn plane_fourcc(format: SurfaceFormat, index: usize) -> u32 {
    match (format, index) {
        (SurfaceFormat::Nv12 | SurfaceFormat::Yuv420p, 0) => drm_formats::DRM_FORMAT_R8,
        (SurfaceFormat::Nv12, _) => drm_formats::DRM_FORMAT_GR88,
        (SurfaceFormat::Yuv420p, _) => drm_formats::DRM_FORMAT_R8,
        (SurfaceFormat::P010, 0) => drm_formats::DRM_FORMAT_R16,
        (SurfaceFormat::P010, _) => drm_formats::DRM_FORMAT_GR1616,
        (SurfaceFormat::Rgba8, _) => drm_formats::DRM_FORMAT_ABGR8888,
    }
}

impl VaapiDisplay for FakeVaapiDisplay {
    fn sync_surface(&self, surface: SurfaceHandle, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.syncs += 1;
        if state.failing_syncs > 0 {
            state.failing_syncs -= 1;
            return Err(InteropError::ImportFailed(format!("vaSyncSurface({}) failed", surface)));
        }
        Ok(())
    }

    fn export_surface(&self, surface: SurfaceHandle) -> Result<PrimeSurface> {
        let mut state = self.state.lock();
        if state.failing_exports > 0 {
            state.failing_exports -= 1;
            return Err(InteropError::ImportFailed(format!(
                "vaExportSurfaceHandle({}) failed",
                surface
            )));
        }
        state.exports += 1;

        let format = state.format;
        let width = state.width;
        let layers = (0..format.plane_count())
            .map(|index| {
                let fd = state.next_fd;
                state.next_fd += 1;
                state.open_fds.insert(fd);
                let bytes = format
                    .plane_format(index)
                    .map(|plane| plane.bytes_per_texel())
                    .unwrap_or(1);
                PrimeLayer {
                    drm_format: plane_fourcc(format, index),
                    object_fd: fd,
                    offset: 0,
                    pitch: format.plane_size(index, width, state.height).0 * bytes,
                    modifier: 0,
                }
            })
            .collect();

        Ok(PrimeSurface {
            surface,
            width,
            height: state.height,
            layers,
        })
    }

    fn close_export(&self, export: PrimeSurface) {
        let mut state = self.state.lock();
        for layer in export.layers {
            if !state.open_fds.remove(&layer.object_fd) {
                tracing::error!("FakeVaapiDisplay: fd {} closed twice", layer.object_fd);
            }
        }
    }
}
