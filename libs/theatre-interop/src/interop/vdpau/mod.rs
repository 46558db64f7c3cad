// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! VDPAU → OpenGL interop through `NV_vdpau_interop`.
//!
//! The video mixer renders each decode surface (one field at a time for
//! interlaced scans) into a per-surface RGBA output surface. The output
//! surface is registered with GL once; it is mapped for the draw and
//! unmapped before the mixer touches any output surface again.

mod helper;

use std::sync::Arc;

pub use helper::{
    ChromaType, DecoderCapability, DecoderProfile, MixerId, OutputSurfaceId, PictureStructure,
    StreamParameters, VdpauDevice, VdpauHelper, check_decode, check_h264_decode,
    check_hevc_decode, have_mpeg4_decode, have_vdpau,
};

use super::instance::InteropBackend;
use super::texture_cache::CachedSurface;
use super::{InteropType, PlaneFormat, TextureId, TextureSet, TextureTarget, VideoTexture};
use crate::colour::ColourSpace;
use crate::error::{InteropError, Result};
use crate::frame::{ScanType, VideoFrame};
use crate::render::{ContextDispatcher, RenderContext, TextureDescriptor};

/// `GLvdpauSurfaceNV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisteredSurface(pub u64);

/// `NV_vdpau_interop` entry points. Every call runs on the render thread.
pub trait VdpauGlInterop: Send + Sync {
    fn register_output_surface(
        &self,
        ctx: &dyn RenderContext,
        surface: OutputSurfaceId,
        texture: TextureId,
    ) -> Result<RegisteredSurface>;

    fn map(&self, ctx: &dyn RenderContext, surface: RegisteredSurface) -> Result<()>;

    fn unmap(&self, ctx: &dyn RenderContext, surface: RegisteredSurface);

    fn unregister(&self, ctx: &dyn RenderContext, surface: RegisteredSurface);
}

/// Native objects behind one cached surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdpauSurface {
    pub output: OutputSurfaceId,
    pub registered: RegisteredSurface,
}

#[derive(Debug, Clone, Copy)]
struct MixerState {
    mixer: MixerId,
    width: u32,
    height: u32,
    chroma: ChromaType,
    colour: ColourSpace,
}

pub struct VdpauInterop {
    helper: VdpauHelper,
    gl: Arc<dyn VdpauGlInterop>,
    dispatcher: ContextDispatcher,
    mixer: Option<MixerState>,
    /// The one output surface currently mapped for GL, if any.
    mapped: Option<RegisteredSurface>,
}

impl VdpauInterop {
    pub fn new(helper: VdpauHelper, gl: Arc<dyn VdpauGlInterop>, dispatcher: ContextDispatcher) -> Self {
        Self {
            helper,
            gl,
            dispatcher,
            mixer: None,
            mapped: None,
        }
    }

    /// Mixer matching the decode surface, recreated when size or chroma change.
    fn ensure_mixer(
        &mut self,
        width: u32,
        height: u32,
        chroma: ChromaType,
        colour: &ColourSpace,
    ) -> Result<MixerId> {
        if let Some(state) = self.mixer {
            if state.width == width && state.height == height && state.chroma == chroma {
                return Ok(state.mixer);
            }
            tracing::debug!(
                "VDPAU surface changed to {}x{} {:?}, recreating mixer",
                width,
                height,
                chroma
            );
            self.helper.device().delete_mixer(state.mixer);
            self.mixer = None;
        }

        let mixer = self
            .helper
            .create_mixer(width, height, chroma, &colour.csc_matrix())?;
        self.mixer = Some(MixerState {
            mixer,
            width,
            height,
            chroma,
            colour: *colour,
        });
        Ok(mixer)
    }

    /// Mixer for the draw, with the CSC matrix updated if `colour` changed.
    fn mixer_for(&mut self, colour: &ColourSpace) -> Result<MixerId> {
        let Some(state) = self.mixer.as_mut() else {
            return Err(InteropError::ImportFailed("VDPAU mixer not created".into()));
        };
        if state.colour != *colour {
            self.helper
                .device()
                .set_csc_matrix(state.mixer, &colour.csc_matrix())?;
            state.colour = *colour;
        }
        Ok(state.mixer)
    }

    fn unmap_current(&mut self) {
        if let Some(mapped) = self.mapped.take() {
            let gl = Arc::clone(&self.gl);
            self.dispatcher.run_async(move |ctx| gl.unmap(ctx, mapped));
        }
    }
}

impl InteropBackend for VdpauInterop {
    type Native = VdpauSurface;

    fn interop_type(&self) -> InteropType {
        InteropType::Vdpau
    }

    fn import(
        &mut self,
        frame: &VideoFrame,
        _colour: &ColourSpace,
        _scan: ScanType,
    ) -> Result<CachedSurface<VdpauSurface>> {
        let device = Arc::clone(self.helper.device());
        let output = device.create_output_surface(frame.width, frame.height)?;
        let gl = Arc::clone(&self.gl);
        let reclaim_gl = Arc::clone(&self.gl);
        let desc = TextureDescriptor::new(frame.width, frame.height, PlaneFormat::Rgba8);

        let registered = self.dispatcher.run_blocking_or_reclaim(
            move |ctx: &dyn RenderContext| -> Result<(TextureId, RegisteredSurface)> {
                let texture = ctx.create_texture(&desc)?;
                match gl.register_output_surface(ctx, output, texture) {
                    Ok(registered) => Ok((texture, registered)),
                    Err(e) => {
                        ctx.delete_texture(texture);
                        Err(e)
                    }
                }
            },
            move |ctx, late| {
                if let Ok((texture, registered)) = late {
                    reclaim_gl.unregister(ctx, registered);
                    ctx.delete_texture(texture);
                }
            },
        );

        let (texture, registered) = match registered {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) | Err(e) => {
                device.delete_output_surface(output);
                return Err(e);
            }
        };

        tracing::debug!(
            "Registered VDPAU output surface {:?} for {}",
            output,
            frame.surface.handle
        );
        let texture = VideoTexture {
            id: texture,
            target: TextureTarget::Texture2D,
            format: PlaneFormat::Rgba8,
            width: frame.width,
            height: frame.height,
            plane: 0,
        };
        Ok(CachedSurface::new(
            TextureSet::single(texture, frame.width, frame.height, frame.visible_rect()),
            VdpauSurface { output, registered },
        ))
    }

    fn refresh(
        &mut self,
        frame: &VideoFrame,
        colour: &ColourSpace,
        scan: ScanType,
        cached: &mut CachedSurface<VdpauSurface>,
    ) -> Result<()> {
        let device = Arc::clone(self.helper.device());
        // One mixer serves every surface; match it to this one before rendering.
        let (chroma, width, height) = device.surface_parameters(frame.surface.handle)?;
        self.ensure_mixer(width, height, chroma, colour)?;
        let mixer = self.mixer_for(colour)?;
        let gl = Arc::clone(&self.gl);
        let reclaim_gl = Arc::clone(&self.gl);
        let source = frame.surface.handle;
        let VdpauSurface { output, registered } = cached.native;
        let structure = PictureStructure::from(scan);
        // Unmap before the mixer writes to any output surface.
        let previous = self.mapped.take();

        self.dispatcher.run_blocking_or_reclaim(
            move |ctx: &dyn RenderContext| -> Result<()> {
                if let Some(previous) = previous {
                    gl.unmap(ctx, previous);
                }
                device.mixer_render(mixer, source, output, structure)?;
                gl.map(ctx, registered)
            },
            move |ctx, late| {
                if late.is_ok() {
                    reclaim_gl.unmap(ctx, registered);
                }
            },
        )??;

        self.mapped = Some(registered);
        Ok(())
    }

    fn release(&mut self, cached: CachedSurface<VdpauSurface>) {
        let VdpauSurface { output, registered } = cached.native;
        let was_mapped = self.mapped == Some(registered);
        if was_mapped {
            self.mapped = None;
        }
        let device = Arc::clone(self.helper.device());
        let gl = Arc::clone(&self.gl);
        let textures = cached.textures.texture_ids();

        // The output surface must outlive its GL registration.
        self.dispatcher.run_async(move |ctx| {
            if was_mapped {
                gl.unmap(ctx, registered);
            }
            gl.unregister(ctx, registered);
            for texture in textures {
                ctx.delete_texture(texture);
            }
            device.delete_output_surface(output);
        });
    }

    fn teardown(&mut self) {
        self.unmap_current();
        if let Some(state) = self.mixer.take() {
            self.helper.device().delete_mixer(state.mixer);
        }
        tracing::debug!("VDPAU interop released");
    }
}
