// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-surface rate limit on failing native imports.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::frame::{LiveSurfaces, SurfaceHandle};

/// Whether a failure should be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureLog {
    /// First failure in a window; `suppressed` failures and skipped
    /// attempts since the last logged one.
    Log { suppressed: u32 },
    Quiet,
}

#[derive(Debug)]
struct FailureWindow {
    start: Instant,
    attempts: u32,
    suppressed: u32,
}

/// Allows at most `max_attempts` native imports per `window` for a surface
/// that has been failing. Surfaces that never failed are not limited.
#[derive(Debug)]
pub struct ImportThrottle {
    max_attempts: u32,
    window: Duration,
    failing: HashMap<SurfaceHandle, FailureWindow>,
}

impl ImportThrottle {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window,
            failing: HashMap::new(),
        }
    }

    pub fn per_second(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::from_secs(1))
    }

    /// Whether an import for `handle` may be attempted at `now`.
    pub fn allow(&mut self, handle: SurfaceHandle, now: Instant) -> bool {
        let Some(state) = self.failing.get_mut(&handle) else {
            return true;
        };
        if now.duration_since(state.start) >= self.window {
            state.start = now;
            state.attempts = 0;
            return true;
        }
        if state.attempts < self.max_attempts {
            return true;
        }
        state.suppressed += 1;
        false
    }

    pub fn record_failure(&mut self, handle: SurfaceHandle, now: Instant) -> FailureLog {
        let window = self.window;
        let state = self.failing.entry(handle).or_insert(FailureWindow {
            start: now,
            attempts: 0,
            suppressed: 0,
        });
        if now.duration_since(state.start) >= window {
            state.start = now;
            state.attempts = 0;
        }
        state.attempts += 1;

        if state.attempts == 1 {
            let suppressed = std::mem::take(&mut state.suppressed);
            FailureLog::Log { suppressed }
        } else {
            state.suppressed += 1;
            FailureLog::Quiet
        }
    }

    pub fn record_success(&mut self, handle: SurfaceHandle) {
        self.failing.remove(&handle);
    }

    /// Forget surfaces that are no longer live.
    pub fn retain(&mut self, live: &LiveSurfaces) {
        self.failing.retain(|handle, _| live.contains_handle(*handle));
    }

    pub fn clear(&mut self) {
        self.failing.clear();
    }

    pub fn failing(&self) -> usize {
        self.failing.len()
    }
}
