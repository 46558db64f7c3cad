// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::frame::SurfaceHandle;

#[derive(Error, Debug)]
pub enum InteropError {
    #[error("Unsupported interop: {0}")]
    Unsupported(String),

    #[error("Surface import failed: {0}")]
    ImportFailed(String),

    #[error("GPU resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Surface {0} is not live in this decode session")]
    StaleSurface(SurfaceHandle),

    #[error("Interop has been torn down")]
    TornDown,

    #[error("Fence wait exceeded {0}ms")]
    FenceTimeout(u64),

    #[error("Render thread did not run dispatched work within {0}ms")]
    DispatchTimeout(u64),

    #[error("In-flight acquires did not drain within {0}ms")]
    DrainTimeout(u64),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InteropError {
    /// Allocation failure that may clear after the cache gives back its textures.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_))
    }

    /// Per-frame failure: skip the frame, keep the stream.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ImportFailed(_)
                | Self::ResourceExhausted(_)
                | Self::StaleSurface(_)
                | Self::FenceTimeout(_)
                | Self::DispatchTimeout(_)
                | Self::InvalidFrame(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, InteropError>;
