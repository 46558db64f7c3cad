// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

/// Per-instance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteropStats {
    pub acquires: u64,
    pub cache_hits: u64,
    /// Successful native imports.
    pub imports: u64,
    pub import_failures: u64,
    /// Imports skipped by the failure throttle.
    pub throttled: u64,
    /// Acquires refused before any native call (stale surface, torn down, bad frame).
    pub rejected: u64,
    pub evictions: u64,
    /// Acquires served without a CPU copy.
    pub zero_copy: u64,
}

impl InteropStats {
    /// Fraction of acquires served from the cache.
    pub fn hit_ratio(&self) -> f64 {
        if self.acquires == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / self.acquires as f64
    }

    /// Percentage of acquires that produced textures without a copy.
    pub fn zero_copy_percentage(&self) -> f64 {
        if self.acquires == 0 {
            return 0.0;
        }
        (self.zero_copy as f64 / self.acquires as f64) * 100.0
    }
}
