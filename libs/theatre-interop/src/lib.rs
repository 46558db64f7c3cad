// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Zero-copy hand-off of hardware decode surfaces to renderer textures.
//!
//! The decoder side describes frames ([`VideoFrame`]) and owns the surface
//! pool ([`DecodeSurfaceProvider`]). The render side picks an interop once
//! per stream ([`InteropSelector`]), creates it ([`create_interop`]) and
//! calls `acquire` for every displayed frame.

pub mod codec;
pub mod colour;
pub mod config;
pub mod error;
pub mod frame;
pub mod interop;
pub mod render;

pub use codec::{CodecDescriptor, DecodeApi, VideoCodec};
pub use colour::{ColourMatrix, ColourRange, ColourSpace, CscMatrix};
pub use config::{InteropConfig, select_renderer};
pub use error::{InteropError, Result};
pub use frame::{
    DecodeSessionId, DecodeSurface, DecodeSurfaceProvider, Field, LiveSurfaces, ScanType,
    SurfaceFormat, SurfaceHandle, VideoFrame,
};
pub use interop::{
    BackendDevice, CropRect, HostCapabilities, Interop, InteropLease, InteropSelector,
    InteropStats, InteropSupport, InteropType, SharedInterop, TextureId, TextureSet, VideoTexture,
    Windowing, create_interop, retrieve,
};
pub use render::{ContextDispatcher, RenderContext};
