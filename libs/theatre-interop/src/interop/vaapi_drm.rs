// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! VAAPI → EGL zero-copy interop through DMA-BUF export.
//!
//! Each decode surface is exported once with its planes as separate DRM
//! layers, and every layer is imported as its own texture. The imported
//! textures alias decoder memory, so a cache hit only needs a surface sync
//! before drawing.

use std::sync::Arc;
use std::time::Duration;

use super::instance::InteropBackend;
use super::texture_cache::CachedSurface;
use super::{InteropType, PlaneFormat, TextureSet, TextureTarget, VideoTexture};
use crate::colour::ColourSpace;
use crate::config::InteropConfig;
use crate::error::{InteropError, Result};
use crate::frame::{ScanType, SurfaceHandle, VideoFrame};
use crate::render::{ContextDispatcher, DmaBufImage, FenceStatus};

/// One plane of an exported surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimeLayer {
    pub drm_format: u32,
    pub object_fd: i32,
    pub offset: u32,
    pub pitch: u32,
    pub modifier: u64,
}

/// Result of `vaExportSurfaceHandle` with separate layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimeSurface {
    pub surface: SurfaceHandle,
    pub width: u32,
    pub height: u32,
    pub layers: Vec<PrimeLayer>,
}

/// The VA display, as far as this interop needs it.
pub trait VaapiDisplay: Send + Sync {
    /// Wait for decoding into `surface` to finish.
    fn sync_surface(&self, surface: SurfaceHandle, timeout: Duration) -> Result<()>;

    /// Export `surface` as DMA-BUF objects; the caller owns the fds.
    fn export_surface(&self, surface: SurfaceHandle) -> Result<PrimeSurface>;

    /// Close the fds of an export.
    fn close_export(&self, export: PrimeSurface);
}

/// Closes the export once the render thread is done with the fds.
struct ExportGuard {
    display: Arc<dyn VaapiDisplay>,
    export: Option<PrimeSurface>,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        if let Some(export) = self.export.take() {
            self.display.close_export(export);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PlaneImport {
    image: DmaBufImage,
    format: PlaneFormat,
    plane: u8,
}

pub struct VaapiDrmInterop {
    display: Arc<dyn VaapiDisplay>,
    dispatcher: ContextDispatcher,
    fence_timeout: Duration,
}

impl VaapiDrmInterop {
    pub fn new(
        display: Arc<dyn VaapiDisplay>,
        dispatcher: ContextDispatcher,
        config: &InteropConfig,
    ) -> Self {
        Self {
            display,
            dispatcher,
            fence_timeout: config.fence_timeout(),
        }
    }

    fn plane_imports(frame: &VideoFrame, export: &PrimeSurface) -> Result<Vec<PlaneImport>> {
        let planes = frame.format.plane_count();
        if export.layers.len() != planes {
            return Err(InteropError::ImportFailed(format!(
                "{:?} surface exported {} layers, expected {}",
                frame.format,
                export.layers.len(),
                planes
            )));
        }

        export
            .layers
            .iter()
            .enumerate()
            .map(|(index, layer)| {
                let format = frame.format.plane_format(index).ok_or_else(|| {
                    InteropError::ImportFailed(format!("No plane {} in {:?}", index, frame.format))
                })?;
                if layer.drm_format != format.drm_fourcc() {
                    return Err(InteropError::ImportFailed(format!(
                        "Plane {} fourcc {:#010x} does not match {:?}",
                        index, layer.drm_format, format
                    )));
                }
                let (width, height) = frame.format.plane_size(index, frame.width, frame.height);
                Ok(PlaneImport {
                    image: DmaBufImage {
                        fd: layer.object_fd,
                        fourcc: layer.drm_format,
                        modifier: layer.modifier,
                        offset: layer.offset,
                        pitch: layer.pitch,
                        width,
                        height,
                    },
                    format,
                    plane: index as u8,
                })
            })
            .collect()
    }
}

impl InteropBackend for VaapiDrmInterop {
    type Native = ();

    fn interop_type(&self) -> InteropType {
        InteropType::VaapiEglDrm
    }

    fn import(
        &mut self,
        frame: &VideoFrame,
        _colour: &ColourSpace,
        _scan: ScanType,
    ) -> Result<CachedSurface<()>> {
        let handle = frame.surface.handle;
        let export = self.display.export_surface(handle)?;
        let guard = ExportGuard {
            display: Arc::clone(&self.display),
            export: Some(export),
        };
        let imports = match guard.export.as_ref() {
            Some(export) => Self::plane_imports(frame, export)?,
            None => Vec::new(),
        };
        let fence_timeout = self.fence_timeout;

        let textures = self.dispatcher.run_blocking_or_reclaim(
            move |ctx| {
                let _guard = guard;
                let discard = |textures: &[VideoTexture]| {
                    for texture in textures {
                        ctx.delete_texture(texture.id);
                    }
                };

                let mut textures: Vec<VideoTexture> = Vec::with_capacity(imports.len());
                for import in &imports {
                    match ctx.import_dma_buf(&import.image, TextureTarget::Texture2D) {
                        Ok(id) => textures.push(VideoTexture {
                            id,
                            target: TextureTarget::Texture2D,
                            format: import.format,
                            width: import.image.width,
                            height: import.image.height,
                            plane: import.plane,
                        }),
                        Err(e) => {
                            discard(&textures);
                            return Err(e);
                        }
                    }
                }

                let fence = match ctx.insert_fence() {
                    Ok(fence) => fence,
                    Err(e) => {
                        discard(&textures);
                        return Err(e);
                    }
                };
                let status = ctx.wait_fence(fence, fence_timeout);
                ctx.delete_fence(fence);
                if status == FenceStatus::TimedOut {
                    discard(&textures);
                    return Err(InteropError::FenceTimeout(fence_timeout.as_millis() as u64));
                }
                Ok(textures)
            },
            |ctx, late| {
                if let Ok(textures) = late {
                    for texture in textures {
                        ctx.delete_texture(texture.id);
                    }
                }
            },
        )??;

        tracing::debug!("Imported {} as {} DMA-BUF planes", handle, textures.len());
        let set = TextureSet::new(textures, frame.width, frame.height, frame.visible_rect())
            .map_err(|rejected| {
                self.dispatcher.delete_textures(rejected.texture_ids());
                InteropError::ImportFailed(format!("{}: {}", handle, rejected))
            })?;
        Ok(CachedSurface::new(set, ()))
    }

    fn refresh(
        &mut self,
        frame: &VideoFrame,
        _colour: &ColourSpace,
        _scan: ScanType,
        _cached: &mut CachedSurface<()>,
    ) -> Result<()> {
        self.display.sync_surface(frame.surface.handle, self.fence_timeout)
    }

    fn release(&mut self, cached: CachedSurface<()>) {
        self.dispatcher.delete_textures(cached.textures.texture_ids());
    }

    fn teardown(&mut self) {
        tracing::debug!("VAAPI DRM interop released, {} deletions pending", self.dispatcher.pending());
    }
}
