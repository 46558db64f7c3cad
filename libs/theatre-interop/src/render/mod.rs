// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Render-side collaborators: the graphics context and its work queue.

mod context;
mod dispatch;

pub use context::{
    DmaBufImage, FenceId, FenceStatus, RenderContext, TextureDescriptor, drm_formats, fourcc,
};
pub use dispatch::ContextDispatcher;
