// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use theatre_interop::interop::vdpau::{
    ChromaType, DecoderCapability, DecoderProfile, MixerId, OutputSurfaceId, PictureStructure,
    RegisteredSurface, VdpauDevice, VdpauGlInterop, VdpauHelper,
};
use theatre_interop::interop::TextureId;
use theatre_interop::render::RenderContext;
use theatre_interop::{BackendDevice, CscMatrix, InteropError, Result, SurfaceHandle};

/// One `VdpVideoMixerRender` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerRender {
    pub mixer: MixerId,
    pub source: SurfaceHandle,
    pub dest: OutputSurfaceId,
    pub structure: PictureStructure,
}

#[derive(Debug)]
struct VdpauState {
    next_id: u32,
    surface_chroma: ChromaType,
    surface_size: Option<(u32, u32)>,
    per_surface: HashMap<SurfaceHandle, (ChromaType, u32, u32)>,
    outputs: HashSet<OutputSurfaceId>,
    mixers: HashMap<MixerId, (ChromaType, u32, u32)>,
    registered: HashMap<RegisteredSurface, OutputSurfaceId>,
    mapped: HashSet<RegisteredSurface>,
    renders: Vec<MixerRender>,
    csc_updates: u64,
    capability_queries: u64,
    capabilities: HashMap<DecoderProfile, DecoderCapability>,
    violations: Vec<String>,
}

/// VDPAU device plus `NV_vdpau_interop` in one object, so GL state is
/// visible to the mixer.
///
/// Protocol errors (rendering into a mapped surface, deleting a surface
/// that is still registered, GL calls off the render thread) are
/// recorded in [`violations`](Self::violations).
#[derive(Debug)]
pub struct FakeVdpau {
    state: Mutex<VdpauState>,
}

impl FakeVdpau {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(VdpauState {
                next_id: 1,
                surface_chroma: ChromaType::Type420,
                surface_size: None,
                per_surface: HashMap::new(),
                outputs: HashSet::new(),
                mixers: HashMap::new(),
                registered: HashMap::new(),
                mapped: HashSet::new(),
                renders: Vec::new(),
                csc_updates: 0,
                capability_queries: 0,
                capabilities: HashMap::new(),
                violations: Vec::new(),
            }),
        })
    }

    /// Device for [`theatre_interop::create_interop`].
    pub fn backend_device(self: &Arc<Self>) -> BackendDevice {
        let device: Arc<dyn VdpauDevice> = self.clone();
        let gl: Arc<dyn VdpauGlInterop> = self.clone();
        BackendDevice::Vdpau {
            helper: VdpauHelper::new(device),
            gl,
        }
    }

    /// Decode surfaces report this chroma and size. Without a size they
    /// report 1920x1080.
    pub fn set_surface_parameters(&self, chroma: ChromaType, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.surface_chroma = chroma;
        state.surface_size = Some((width, height));
    }

    /// Chroma and size reported for one decode surface only.
    pub fn set_surface_parameters_for(
        &self,
        surface: impl Into<SurfaceHandle>,
        chroma: ChromaType,
        width: u32,
        height: u32,
    ) {
        self.state
            .lock()
            .per_surface
            .insert(surface.into(), (chroma, width, height));
    }

    pub fn set_capability(&self, profile: DecoderProfile, capability: DecoderCapability) {
        self.state.lock().capabilities.insert(profile, capability);
    }

    pub fn live_output_surfaces(&self) -> usize {
        self.state.lock().outputs.len()
    }

    pub fn live_mixers(&self) -> usize {
        self.state.lock().mixers.len()
    }

    pub fn registered(&self) -> usize {
        self.state.lock().registered.len()
    }

    pub fn mapped(&self) -> usize {
        self.state.lock().mapped.len()
    }

    pub fn renders(&self) -> Vec<MixerRender> {
        self.state.lock().renders.clone()
    }

    pub fn csc_updates(&self) -> u64 {
        self.state.lock().csc_updates
    }

    pub fn capability_queries(&self) -> u64 {
        self.state.lock().capability_queries
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    /// Native objects still alive.
    pub fn leaked(&self) -> usize {
        let state = self.state.lock();
        state.outputs.len() + state.mixers.len() + state.registered.len()
    }

    fn next_id(state: &mut VdpauState) -> u32 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    fn parameters_of(state: &VdpauState, surface: SurfaceHandle) -> (ChromaType, u32, u32) {
        if let Some(parameters) = state.per_surface.get(&surface) {
            return *parameters;
        }
        let (width, height) = state.surface_size.unwrap_or((1920, 1080));
        (state.surface_chroma, width, height)
    }

    fn violation(state: &mut VdpauState, message: String) {
        tracing::error!("FakeVdpau: {}", message);
        state.violations.push(message);
    }

    fn check_render_thread(state: &mut VdpauState, ctx: &dyn RenderContext, call: &str) {
        if !ctx.is_current_thread() {
            Self::violation(state, format!("{} off the render thread", call));
        }
    }
}

impl VdpauDevice for FakeVdpau {
    fn surface_parameters(&self, surface: SurfaceHandle) -> Result<(ChromaType, u32, u32)> {
        let state = self.state.lock();
        Ok(Self::parameters_of(&state, surface))
    }

    fn create_output_surface(&self, _width: u32, _height: u32) -> Result<OutputSurfaceId> {
        let mut state = self.state.lock();
        let id = OutputSurfaceId(Self::next_id(&mut state));
        state.outputs.insert(id);
        Ok(id)
    }

    fn create_mixer(&self, width: u32, height: u32, chroma: ChromaType) -> Result<MixerId> {
        let mut state = self.state.lock();
        let id = MixerId(Self::next_id(&mut state));
        state.mixers.insert(id, (chroma, width, height));
        Ok(id)
    }

    fn mixer_render(
        &self,
        mixer: MixerId,
        source: SurfaceHandle,
        dest: OutputSurfaceId,
        structure: PictureStructure,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let Some(mixer_parameters) = state.mixers.get(&mixer).copied() else {
            return Err(InteropError::ImportFailed(format!("mixer render with unknown {:?}", mixer)));
        };
        if !state.outputs.contains(&dest) {
            return Err(InteropError::ImportFailed(format!("mixer render into unknown {:?}", dest)));
        }
        let source_parameters = Self::parameters_of(&state, source);
        if mixer_parameters != source_parameters {
            Self::violation(
                &mut state,
                format!(
                    "{:?} sized {:?} rendered {} sized {:?}",
                    mixer, mixer_parameters, source, source_parameters
                ),
            );
            return Err(InteropError::ImportFailed("mixer does not match surface".into()));
        }
        let mapped_dest = state
            .mapped
            .iter()
            .any(|registered| state.registered.get(registered) == Some(&dest));
        if mapped_dest {
            Self::violation(&mut state, format!("mixer rendered into mapped {:?}", dest));
            return Err(InteropError::ImportFailed("output surface is mapped".into()));
        }
        state.renders.push(MixerRender {
            mixer,
            source,
            dest,
            structure,
        });
        Ok(())
    }

    fn set_csc_matrix(&self, mixer: MixerId, _matrix: &CscMatrix) -> Result<()> {
        let mut state = self.state.lock();
        if !state.mixers.contains_key(&mixer) {
            return Err(InteropError::ImportFailed(format!("unknown {:?}", mixer)));
        }
        state.csc_updates += 1;
        Ok(())
    }

    fn delete_output_surface(&self, surface: OutputSurfaceId) {
        let mut state = self.state.lock();
        if state.registered.values().any(|output| *output == surface) {
            Self::violation(&mut state, format!("{:?} deleted while registered", surface));
        }
        state.outputs.remove(&surface);
    }

    fn delete_mixer(&self, mixer: MixerId) {
        self.state.lock().mixers.remove(&mixer);
    }

    fn decoder_capabilities(&self, profile: DecoderProfile) -> Result<DecoderCapability> {
        let mut state = self.state.lock();
        state.capability_queries += 1;
        Ok(state.capabilities.get(&profile).copied().unwrap_or_default())
    }
}

impl VdpauGlInterop for FakeVdpau {
    fn register_output_surface(
        &self,
        ctx: &dyn RenderContext,
        surface: OutputSurfaceId,
        _texture: TextureId,
    ) -> Result<RegisteredSurface> {
        let mut state = self.state.lock();
        Self::check_render_thread(&mut state, ctx, "VDPARegisterOutputSurfaceNV");
        if !state.outputs.contains(&surface) {
            return Err(InteropError::ImportFailed(format!("unknown {:?}", surface)));
        }
        let registered = RegisteredSurface(u64::from(Self::next_id(&mut state)));
        state.registered.insert(registered, surface);
        Ok(registered)
    }

    fn map(&self, ctx: &dyn RenderContext, surface: RegisteredSurface) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_render_thread(&mut state, ctx, "VDPAUMapSurfacesNV");
        if !state.registered.contains_key(&surface) {
            return Err(InteropError::ImportFailed(format!("{:?} not registered", surface)));
        }
        if !state.mapped.insert(surface) {
            Self::violation(&mut state, format!("{:?} mapped twice", surface));
        }
        Ok(())
    }

    fn unmap(&self, ctx: &dyn RenderContext, surface: RegisteredSurface) {
        let mut state = self.state.lock();
        Self::check_render_thread(&mut state, ctx, "VDPAUUnmapSurfacesNV");
        if !state.mapped.remove(&surface) {
            Self::violation(&mut state, format!("{:?} unmapped while not mapped", surface));
        }
    }

    fn unregister(&self, ctx: &dyn RenderContext, surface: RegisteredSurface) {
        let mut state = self.state.lock();
        Self::check_render_thread(&mut state, ctx, "VDPAUUnregisterSurfaceNV");
        if state.mapped.contains(&surface) {
            Self::violation(&mut state, format!("{:?} unregistered while mapped", surface));
            state.mapped.remove(&surface);
        }
        state.registered.remove(&surface);
    }
}
