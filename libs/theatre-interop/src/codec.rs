// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Codec descriptors: which bitstream, decoded by which API, landing where.

/// Compressed video bitstream family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    Mpeg1,
    Mpeg2,
    Mpeg4,
    H263,
    H264,
    Hevc,
    Vc1,
    Wmv3,
    Vp8,
    Vp9,
    Av1,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mpeg1 => "MPEG-1",
            Self::Mpeg2 => "MPEG-2",
            Self::Mpeg4 => "MPEG-4",
            Self::H263 => "H.263",
            Self::H264 => "H.264",
            Self::Hevc => "HEVC",
            Self::Vc1 => "VC-1",
            Self::Wmv3 => "WMV3",
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::Av1 => "AV1",
        }
    }
}

/// Hardware (or software) decode API that produced the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeApi {
    Software,
    Vaapi,
    Vdpau,
    VideoToolbox,
    MediaCodec,
    Nvdec,
    V4l2,
    Dxva2,
}

impl DecodeApi {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Vaapi => "VAAPI",
            Self::Vdpau => "VDPAU",
            Self::VideoToolbox => "VideoToolbox",
            Self::MediaCodec => "MediaCodec",
            Self::Nvdec => "NVDEC",
            Self::V4l2 => "V4L2",
            Self::Dxva2 => "DXVA2",
        }
    }

    /// Whether this API can decode `codec` in hardware at all.
    pub fn supports(&self, codec: VideoCodec) -> bool {
        use VideoCodec::*;
        match self {
            Self::Software => false,
            Self::Vaapi => matches!(
                codec,
                Mpeg2 | Mpeg4 | H264 | Hevc | Vc1 | Wmv3 | Vp8 | Vp9 | Av1
            ),
            Self::Vdpau => matches!(codec, Mpeg1 | Mpeg2 | Mpeg4 | H264 | Hevc | Vc1 | Wmv3),
            Self::VideoToolbox => matches!(codec, Mpeg1 | Mpeg2 | Mpeg4 | H263 | H264 | Hevc),
            Self::MediaCodec => matches!(codec, Mpeg2 | Mpeg4 | H263 | H264 | Hevc | Vp8 | Vp9 | Av1),
            Self::Nvdec => matches!(
                codec,
                Mpeg1 | Mpeg2 | Mpeg4 | H264 | Hevc | Vc1 | Wmv3 | Vp8 | Vp9 | Av1
            ),
            Self::V4l2 => matches!(codec, Mpeg2 | Mpeg4 | H263 | H264 | Hevc | Vp8 | Vp9),
            Self::Dxva2 => matches!(codec, Mpeg2 | H264 | Hevc | Vc1 | Wmv3 | Vp9),
        }
    }
}

/// Codec id negotiated for a stream.
///
/// `copy_back` marks decoders that download their output into system
/// memory; such frames are ordinary software frames as far as the renderer
/// is concerned and never reach a hardware interop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecDescriptor {
    pub codec: VideoCodec,
    pub api: DecodeApi,
    pub copy_back: bool,
}

impl CodecDescriptor {
    /// Hardware decode leaving frames in GPU surfaces.
    pub fn new(codec: VideoCodec, api: DecodeApi) -> Self {
        Self {
            codec,
            api,
            copy_back: false,
        }
    }

    /// Hardware decode with the output copied back to system memory.
    pub fn copy_back(codec: VideoCodec, api: DecodeApi) -> Self {
        Self {
            codec,
            api,
            copy_back: true,
        }
    }

    /// Plain software decode.
    pub fn software(codec: VideoCodec) -> Self {
        Self::new(codec, DecodeApi::Software)
    }

    /// Whether frames stay in GPU surfaces owned by a hardware decoder.
    pub fn is_hardware_surface(&self) -> bool {
        !self.copy_back && self.api != DecodeApi::Software && self.api.supports(self.codec)
    }
}

impl std::fmt::Display for CodecDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.codec.as_str(), self.api.as_str())?;
        if self.copy_back {
            write!(f, " (copy-back)")?;
        }
        Ok(())
    }
}
