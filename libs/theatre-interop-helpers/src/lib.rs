// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Test doubles for `theatre-interop`.
//!
//! Every fake counts the native objects it hands out, so tests can assert
//! that teardown leaves nothing behind.

mod fake_vaapi;
mod fake_vdpau;
mod surface_pool;
mod tracking_context;

pub use fake_vaapi::FakeVaapiDisplay;
pub use fake_vdpau::{FakeVdpau, MixerRender};
pub use surface_pool::FakeSurfacePool;
pub use tracking_context::TrackingRenderContext;

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness. `RUST_LOG` overrides the
/// default `debug` level.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
