// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Bounded cache from decode surface to imported textures.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use super::TextureSet;
use crate::colour::ColourSpace;
use crate::frame::{DecodeSurface, LiveSurfaces, SurfaceFormat, SurfaceHandle, VideoFrame};

/// Parameters an entry was imported with. A lookup with a different key
/// invalidates the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
    pub colour: ColourSpace,
}

impl CacheKey {
    pub fn for_frame(frame: &VideoFrame, colour: &ColourSpace) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            format: frame.format,
            colour: *colour,
        }
    }
}

/// Imported textures plus whatever native objects the backend keeps with them.
#[derive(Debug)]
pub struct CachedSurface<N> {
    pub textures: TextureSet,
    pub native: N,
}

impl<N> CachedSurface<N> {
    pub fn new(textures: TextureSet, native: N) -> Self {
        Self { textures, native }
    }
}

struct CacheEntry<N> {
    generation: u64,
    key: CacheKey,
    surface: CachedSurface<N>,
    last_used: u64,
}

/// At most one entry per surface handle, at most `capacity` entries.
///
/// Every removal hands the entry to a caller-supplied `release` callback,
/// which must destroy its native resources.
pub struct TextureCache<N> {
    entries: HashMap<SurfaceHandle, CacheEntry<N>>,
    capacity: usize,
    frame: u64,
}

impl<N> TextureCache<N> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity: capacity.max(1),
            frame: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, handle: SurfaceHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn handles(&self) -> Vec<SurfaceHandle> {
        let mut handles: Vec<_> = self.entries.keys().copied().collect();
        handles.sort();
        handles
    }

    /// Entry for `handle` without validation or LRU bookkeeping.
    pub fn get_mut(&mut self, handle: SurfaceHandle) -> Option<&mut CachedSurface<N>> {
        self.entries.get_mut(&handle).map(|e| &mut e.surface)
    }

    fn tick(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }

    /// Entry for `surface` if it was imported from the same allocation with
    /// the same `key`. A stale or mismatched entry is released and `None`
    /// returned.
    pub fn lookup<F>(
        &mut self,
        surface: &DecodeSurface,
        key: &CacheKey,
        release: F,
    ) -> Option<&mut CachedSurface<N>>
    where
        F: FnOnce(SurfaceHandle, CachedSurface<N>),
    {
        let handle = surface.handle;
        let valid = match self.entries.get(&handle) {
            None => return None,
            Some(entry) => entry.generation == surface.generation && entry.key == *key,
        };

        if !valid {
            if let Some(entry) = self.entries.remove(&handle) {
                tracing::debug!(
                    "TextureCache: invalidating {} (generation {} -> {})",
                    handle,
                    entry.generation,
                    surface.generation
                );
                release(handle, entry.surface);
            }
            return None;
        }

        let frame = self.tick();
        let entry = self.entries.get_mut(&handle)?;
        entry.last_used = frame;
        Some(&mut entry.surface)
    }

    /// Insert an entry, replacing any previous entry for the handle and
    /// evicting the least recently used entry when full.
    pub fn insert<F>(
        &mut self,
        surface: DecodeSurface,
        key: CacheKey,
        cached: CachedSurface<N>,
        mut release: F,
    ) -> &mut CachedSurface<N>
    where
        F: FnMut(SurfaceHandle, CachedSurface<N>),
    {
        let handle = surface.handle;
        if !self.entries.contains_key(&handle) {
            while self.entries.len() >= self.capacity {
                let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(h, _)| *h)
                else {
                    break;
                };
                if let Some(entry) = self.entries.remove(&oldest) {
                    tracing::debug!("TextureCache: full, evicting {}", oldest);
                    release(oldest, entry.surface);
                }
            }
        }

        let entry = CacheEntry {
            generation: surface.generation,
            key,
            surface: cached,
            last_used: self.tick(),
        };
        match self.entries.entry(handle) {
            Entry::Occupied(mut occupied) => {
                let old = std::mem::replace(occupied.get_mut(), entry);
                release(handle, old.surface);
                &mut occupied.into_mut().surface
            }
            Entry::Vacant(vacant) => &mut vacant.insert(entry).surface,
        }
    }

    /// Release every entry whose surface is not in `live` (by handle and
    /// generation). Returns the number released.
    pub fn evict_stale<F>(&mut self, live: &LiveSurfaces, mut release: F) -> usize
    where
        F: FnMut(SurfaceHandle, CachedSurface<N>),
    {
        let stale: Vec<SurfaceHandle> = self
            .entries
            .iter()
            .filter(|(handle, entry)| !live.contains(&DecodeSurface::new(**handle, entry.generation)))
            .map(|(handle, _)| *handle)
            .collect();

        for handle in &stale {
            if let Some(entry) = self.entries.remove(handle) {
                tracing::debug!("TextureCache: evicting retired surface {}", handle);
                release(*handle, entry.surface);
            }
        }
        stale.len()
    }

    /// Release everything. Returns the number released.
    pub fn clear<F>(&mut self, mut release: F) -> usize
    where
        F: FnMut(SurfaceHandle, CachedSurface<N>),
    {
        let count = self.entries.len();
        for (handle, entry) in self.entries.drain() {
            release(handle, entry.surface);
        }
        count
    }
}

impl<N> Drop for TextureCache<N> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            tracing::warn!(
                "TextureCache dropped with {} entries still cached; native resources leaked",
                self.entries.len()
            );
        }
    }
}
