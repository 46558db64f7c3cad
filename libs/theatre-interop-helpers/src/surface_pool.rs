// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use theatre_interop::{
    CodecDescriptor, DecodeApi, DecodeSessionId, DecodeSurface, DecodeSurfaceProvider,
    LiveSurfaces, SurfaceFormat, SurfaceHandle, VideoCodec, VideoFrame,
};

#[derive(Debug)]
struct PoolState {
    live: HashMap<SurfaceHandle, u64>,
    next_generation: u64,
}

/// Decoder surface pool with explicit liveness and recycling.
///
/// Every (re)allocation of a handle gets a fresh generation.
#[derive(Debug)]
pub struct FakeSurfacePool {
    session: DecodeSessionId,
    codec: CodecDescriptor,
    format: SurfaceFormat,
    width: u32,
    height: u32,
    state: Mutex<PoolState>,
}

impl FakeSurfacePool {
    pub fn new(session: u64, codec: CodecDescriptor, handles: &[u64]) -> Arc<Self> {
        let pool = Self {
            session: DecodeSessionId(session),
            codec,
            format: SurfaceFormat::Nv12,
            width: 1920,
            height: 1080,
            state: Mutex::new(PoolState {
                live: HashMap::new(),
                next_generation: 1,
            }),
        };
        pool.set_live(handles);
        Arc::new(pool)
    }

    /// 1080p H.264 NV12 surfaces from VAAPI.
    pub fn vaapi(handles: &[u64]) -> Arc<Self> {
        Self::new(1, CodecDescriptor::new(VideoCodec::H264, DecodeApi::Vaapi), handles)
    }

    /// 1080p H.264 surfaces from VDPAU.
    pub fn vdpau(handles: &[u64]) -> Arc<Self> {
        Self::new(1, CodecDescriptor::new(VideoCodec::H264, DecodeApi::Vdpau), handles)
    }

    pub fn session(&self) -> DecodeSessionId {
        self.session
    }

    /// Make exactly `handles` live. Handles already live keep their generation.
    pub fn set_live(&self, handles: &[u64]) {
        let mut state = self.state.lock();
        let mut live = HashMap::with_capacity(handles.len());
        for raw in handles {
            let handle = SurfaceHandle::new(*raw);
            let generation = match state.live.get(&handle) {
                Some(generation) => *generation,
                None => {
                    state.next_generation += 1;
                    state.next_generation
                }
            };
            live.insert(handle, generation);
        }
        state.live = live;
    }

    /// Hand `handle` out again as a new allocation.
    pub fn recycle(&self, handle: u64) -> DecodeSurface {
        let mut state = self.state.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        state.live.insert(SurfaceHandle::new(handle), generation);
        DecodeSurface::new(handle, generation)
    }

    /// Current surface for `handle`; generation 0 if it is not live.
    pub fn surface(&self, handle: u64) -> DecodeSurface {
        let generation = self
            .state
            .lock()
            .live
            .get(&SurfaceHandle::new(handle))
            .copied()
            .unwrap_or(0);
        DecodeSurface::new(handle, generation)
    }

    pub fn frame(&self, handle: u64) -> VideoFrame {
        self.frame_with(handle, self.format, self.width, self.height)
    }

    pub fn frame_with(
        &self,
        handle: u64,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> VideoFrame {
        VideoFrame::new(
            self.session,
            self.surface(handle),
            self.codec,
            format,
            width,
            height,
        )
    }
}

impl DecodeSurfaceProvider for FakeSurfacePool {
    fn session(&self) -> DecodeSessionId {
        self.session
    }

    fn live_surfaces(&self) -> LiveSurfaces {
        self.state
            .lock()
            .live
            .iter()
            .map(|(handle, generation)| DecodeSurface::new(*handle, *generation))
            .collect()
    }
}
