// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use theatre_interop::interop::{TextureId, TextureTarget};
use theatre_interop::render::{
    DmaBufImage, FenceId, FenceStatus, RenderContext, TextureDescriptor,
};
use theatre_interop::{InteropError, Result};

#[derive(Debug)]
struct TrackingState {
    owner: ThreadId,
    next_id: u32,
    live_textures: HashSet<TextureId>,
    live_fences: HashSet<FenceId>,
    allocations: u64,
    deletions: u64,
    fences_waited: u64,
    texture_limit: Option<usize>,
    failing_imports: u32,
    fence_status: FenceStatus,
    off_thread_calls: u64,
}

/// Render context that hands out fake texture names and counts them.
///
/// The thread that creates it is the owner thread. Any native call made
/// from another thread is counted in [`off_thread_calls`](Self::off_thread_calls).
#[derive(Debug)]
pub struct TrackingRenderContext {
    max_texture_size: u32,
    state: Mutex<TrackingState>,
}

impl TrackingRenderContext {
    pub fn new() -> Arc<Self> {
        Self::with_max_texture_size(8192)
    }

    pub fn with_max_texture_size(max_texture_size: u32) -> Arc<Self> {
        Arc::new(Self {
            max_texture_size,
            state: Mutex::new(TrackingState {
                owner: thread::current().id(),
                next_id: 1,
                live_textures: HashSet::new(),
                live_fences: HashSet::new(),
                allocations: 0,
                deletions: 0,
                fences_waited: 0,
                texture_limit: None,
                failing_imports: 0,
                fence_status: FenceStatus::Signaled,
                off_thread_calls: 0,
            }),
        })
    }

    /// Make the calling thread the owner.
    pub fn bind_current_thread(&self) {
        self.state.lock().owner = thread::current().id();
    }

    /// Textures plus fences not yet deleted.
    pub fn leaked(&self) -> usize {
        let state = self.state.lock();
        state.live_textures.len() + state.live_fences.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.lock().live_textures.len()
    }

    pub fn is_live(&self, texture: TextureId) -> bool {
        self.state.lock().live_textures.contains(&texture)
    }

    /// Textures created or imported so far.
    pub fn allocations(&self) -> u64 {
        self.state.lock().allocations
    }

    pub fn deletions(&self) -> u64 {
        self.state.lock().deletions
    }

    pub fn fences_waited(&self) -> u64 {
        self.state.lock().fences_waited
    }

    pub fn off_thread_calls(&self) -> u64 {
        self.state.lock().off_thread_calls
    }

    /// Refuse allocations beyond `limit` live textures with `ResourceExhausted`.
    pub fn set_texture_limit(&self, limit: Option<usize>) {
        self.state.lock().texture_limit = limit;
    }

    /// Fail the next `count` DMA-BUF imports.
    pub fn fail_next_imports(&self, count: u32) {
        self.state.lock().failing_imports = count;
    }

    pub fn set_fence_status(&self, status: FenceStatus) {
        self.state.lock().fence_status = status;
    }

    fn check_thread(state: &mut TrackingState) {
        if thread::current().id() != state.owner {
            state.off_thread_calls += 1;
            tracing::error!("TrackingRenderContext: native call off the owner thread");
        }
    }

    fn allocate(state: &mut TrackingState) -> Result<TextureId> {
        if let Some(limit) = state.texture_limit {
            if state.live_textures.len() >= limit {
                return Err(InteropError::ResourceExhausted(format!(
                    "{} textures live",
                    state.live_textures.len()
                )));
            }
        }
        let id = TextureId(state.next_id);
        state.next_id += 1;
        state.live_textures.insert(id);
        state.allocations += 1;
        Ok(id)
    }
}

impl RenderContext for TrackingRenderContext {
    fn is_current_thread(&self) -> bool {
        thread::current().id() == self.state.lock().owner
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn create_texture(&self, _desc: &TextureDescriptor) -> Result<TextureId> {
        let mut state = self.state.lock();
        Self::check_thread(&mut state);
        Self::allocate(&mut state)
    }

    fn import_dma_buf(&self, image: &DmaBufImage, _target: TextureTarget) -> Result<TextureId> {
        let mut state = self.state.lock();
        Self::check_thread(&mut state);
        if state.failing_imports > 0 {
            state.failing_imports -= 1;
            return Err(InteropError::ImportFailed(format!(
                "eglCreateImage failed for fd {}",
                image.fd
            )));
        }
        if image.fd < 0 {
            return Err(InteropError::ImportFailed("invalid fd".into()));
        }
        Self::allocate(&mut state)
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut state = self.state.lock();
        Self::check_thread(&mut state);
        if state.live_textures.remove(&texture) {
            state.deletions += 1;
        } else {
            tracing::error!("TrackingRenderContext: double delete of {:?}", texture);
        }
    }

    fn insert_fence(&self) -> Result<FenceId> {
        let mut state = self.state.lock();
        Self::check_thread(&mut state);
        let fence = FenceId(state.next_id as u64);
        state.next_id += 1;
        state.live_fences.insert(fence);
        Ok(fence)
    }

    fn wait_fence(&self, _fence: FenceId, _timeout: Duration) -> FenceStatus {
        let mut state = self.state.lock();
        Self::check_thread(&mut state);
        state.fences_waited += 1;
        state.fence_status
    }

    fn delete_fence(&self, fence: FenceId) {
        let mut state = self.state.lock();
        Self::check_thread(&mut state);
        state.live_fences.remove(&fence);
    }
}
