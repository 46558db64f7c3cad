// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! VDPAU device surface and process-wide capability checks.

use std::sync::Arc;

use crate::colour::CscMatrix;
use crate::error::Result;
use crate::frame::{ScanType, SurfaceHandle};
use crate::interop::capability::CachedProbe;

/// `VdpOutputSurface`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSurfaceId(pub u32);

/// `VdpVideoMixer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MixerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ChromaType {
    #[default]
    Type420 = 0,
    Type422 = 1,
    Type444 = 2,
}

/// `VdpVideoMixerPictureStructure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PictureStructure {
    TopField = 0,
    BottomField = 1,
    Frame = 2,
}

impl From<ScanType> for PictureStructure {
    fn from(scan: ScanType) -> Self {
        match scan {
            ScanType::Progressive => Self::Frame,
            ScanType::InterlacedTop => Self::TopField,
            ScanType::InterlacedBottom => Self::BottomField,
        }
    }
}

/// `VdpDecoderProfile` values the capability checks use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DecoderProfile {
    H264Baseline = 6,
    H264Main = 7,
    H264High = 8,
    Mpeg4PartSp = 12,
    Mpeg4PartAsp = 13,
    H264ConstrainedBaseline = 22,
    H264Extended = 23,
    H264ProgressiveHigh = 24,
    H264ConstrainedHigh = 25,
    H264High444Predictive = 26,
    HevcMain = 100,
    HevcMain10 = 101,
    HevcMainStill = 102,
    HevcMain12 = 103,
    HevcMain444 = 104,
}

impl DecoderProfile {
    pub fn is_h264(self) -> bool {
        matches!(
            self,
            Self::H264Baseline
                | Self::H264Main
                | Self::H264High
                | Self::H264ConstrainedBaseline
                | Self::H264Extended
                | Self::H264ProgressiveHigh
                | Self::H264ConstrainedHigh
                | Self::H264High444Predictive
        )
    }

    pub fn is_hevc(self) -> bool {
        matches!(
            self,
            Self::HevcMain | Self::HevcMain10 | Self::HevcMain12 | Self::HevcMainStill | Self::HevcMain444
        )
    }
}

/// Result of `VdpDecoderQueryCapabilities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderCapability {
    pub supported: bool,
    pub max_level: u32,
    pub max_macroblocks: u32,
    pub max_width: u32,
    pub max_height: u32,
}

/// Stream parameters checked against decoder capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParameters {
    pub profile: DecoderProfile,
    pub level: u32,
    pub width: u32,
    pub height: u32,
}

impl StreamParameters {
    pub fn macroblocks(&self) -> u32 {
        self.width.div_ceil(16) * self.height.div_ceil(16)
    }
}

/// The VDPAU device functions the interop calls.
///
/// VDPAU is thread-safe, so these may be called from any thread.
pub trait VdpauDevice: Send + Sync {
    /// Chroma type and size of a decode surface.
    fn surface_parameters(&self, surface: SurfaceHandle) -> Result<(ChromaType, u32, u32)>;

    fn create_output_surface(&self, width: u32, height: u32) -> Result<OutputSurfaceId>;

    fn create_mixer(&self, width: u32, height: u32, chroma: ChromaType) -> Result<MixerId>;

    fn mixer_render(
        &self,
        mixer: MixerId,
        source: SurfaceHandle,
        dest: OutputSurfaceId,
        structure: PictureStructure,
    ) -> Result<()>;

    fn set_csc_matrix(&self, mixer: MixerId, matrix: &CscMatrix) -> Result<()>;

    fn delete_output_surface(&self, surface: OutputSurfaceId);

    fn delete_mixer(&self, mixer: MixerId);

    fn decoder_capabilities(&self, profile: DecoderProfile) -> Result<DecoderCapability>;
}

static VDPAU_AVAILABLE: CachedProbe = CachedProbe::new("VDPAU");
static VDPAU_MPEG4_AVAILABLE: CachedProbe = CachedProbe::new("VDPAU MPEG-4 decode");

/// Whether VDPAU works on this host. `probe` runs on the first call only.
pub fn have_vdpau<F>(probe: F) -> bool
where
    F: FnOnce() -> bool,
{
    VDPAU_AVAILABLE.get_or_probe(probe)
}

/// Whether the device decodes MPEG-4 part 2. Checked once per process.
pub fn have_mpeg4_decode(device: &dyn VdpauDevice) -> bool {
    VDPAU_MPEG4_AVAILABLE.get_or_probe(|| {
        [DecoderProfile::Mpeg4PartSp, DecoderProfile::Mpeg4PartAsp]
            .into_iter()
            .any(|profile| {
                device
                    .decoder_capabilities(profile)
                    .map(|caps| caps.supported)
                    .unwrap_or(false)
            })
    })
}

/// Whether the decoder can handle a stream with `params`.
pub fn check_decode(device: &dyn VdpauDevice, params: &StreamParameters) -> bool {
    let caps = match device.decoder_capabilities(params.profile) {
        Ok(caps) => caps,
        Err(e) => {
            tracing::debug!("VDPAU capability query for {:?} failed: {}", params.profile, e);
            return false;
        }
    };
    let ok = caps.supported
        && params.level <= caps.max_level
        && params.width <= caps.max_width
        && params.height <= caps.max_height
        && params.macroblocks() <= caps.max_macroblocks;
    if !ok {
        tracing::debug!("VDPAU cannot decode {:?} ({:?})", params, caps);
    }
    ok
}

/// H.264 check. Constrained baseline falls back to main, which is a superset.
pub fn check_h264_decode(device: &dyn VdpauDevice, params: &StreamParameters) -> bool {
    if !params.profile.is_h264() {
        return false;
    }
    if check_decode(device, params) {
        return true;
    }
    params.profile == DecoderProfile::H264ConstrainedBaseline
        && check_decode(
            device,
            &StreamParameters {
                profile: DecoderProfile::H264Main,
                ..*params
            },
        )
}

pub fn check_hevc_decode(device: &dyn VdpauDevice, params: &StreamParameters) -> bool {
    params.profile.is_hevc() && check_decode(device, params)
}

/// Thin owner of a VDPAU device handle.
#[derive(Clone)]
pub struct VdpauHelper {
    device: Arc<dyn VdpauDevice>,
}

impl VdpauHelper {
    pub fn new(device: Arc<dyn VdpauDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<dyn VdpauDevice> {
        &self.device
    }

    /// Create a mixer with `matrix` loaded as its colour conversion.
    pub fn create_mixer(
        &self,
        width: u32,
        height: u32,
        chroma: ChromaType,
        matrix: &CscMatrix,
    ) -> Result<MixerId> {
        let mixer = self.device.create_mixer(width, height, chroma)?;
        if let Err(e) = self.device.set_csc_matrix(mixer, matrix) {
            self.device.delete_mixer(mixer);
            return Err(e);
        }
        tracing::debug!("Created VDPAU mixer {:?} for {}x{} {:?}", mixer, width, height, chroma);
        Ok(mixer)
    }
}

impl std::fmt::Debug for VdpauHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VdpauHelper").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picture_structure_follows_scan() {
        assert_eq!(PictureStructure::from(ScanType::Progressive), PictureStructure::Frame);
        assert_eq!(PictureStructure::from(ScanType::InterlacedTop), PictureStructure::TopField);
        assert_eq!(
            PictureStructure::from(ScanType::InterlacedBottom),
            PictureStructure::BottomField
        );
    }

    #[test]
    fn test_macroblocks_round_up() {
        let params = StreamParameters {
            profile: DecoderProfile::H264High,
            level: 41,
            width: 1920,
            height: 1080,
        };
        assert_eq!(params.macroblocks(), 120 * 68);
    }

    #[test]
    fn test_profile_families() {
        assert!(DecoderProfile::H264ConstrainedBaseline.is_h264());
        assert!(!DecoderProfile::H264Main.is_hevc());
        assert!(DecoderProfile::HevcMain10.is_hevc());
        assert!(!DecoderProfile::Mpeg4PartAsp.is_h264());
        assert_eq!(DecoderProfile::HevcMain as u32, 100);
    }
}
