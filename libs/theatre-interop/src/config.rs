// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Interop configuration via `theatre-interop.yaml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InteropError, Result};
use crate::interop::InteropType;

/// Environment variable naming a YAML config file.
pub const ENV_CONFIG: &str = "THEATRE_INTEROP_CONFIG";

/// Environment variable listing interop types to disable (comma-separated).
pub const ENV_DISABLE: &str = "THEATRE_INTEROP_DISABLE";

/// Tunables for interop instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteropConfig {
    /// Upper bound on cached surfaces; matches the decoder's pool size.
    pub cache_capacity: usize,

    /// Native import attempts allowed per surface per second after failures.
    pub max_import_attempts_per_second: u32,

    pub fence_timeout_ms: u64,

    /// How long teardown waits for in-flight leases.
    pub drain_timeout_ms: u64,

    /// How long an off-thread caller waits for the render thread.
    pub dispatch_timeout_ms: u64,

    /// Opaque renderer name, matched against the allowed renderers.
    pub preferred_renderer: Option<String>,

    pub disabled_interops: Vec<InteropType>,
}

impl Default for InteropConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 32,
            max_import_attempts_per_second: 3,
            fence_timeout_ms: 100,
            drain_timeout_ms: 2000,
            dispatch_timeout_ms: 500,
            preferred_renderer: None,
            disabled_interops: Vec::new(),
        }
    }
}

impl InteropConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "theatre-interop.yaml";

    /// Load a config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InteropError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config = Self::from_yaml_str(&content).map_err(|e| {
            InteropError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::info!("Loaded interop config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| InteropError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// Priority: explicit config → file named by `THEATRE_INTEROP_CONFIG` →
    /// defaults. `THEATRE_INTEROP_DISABLE` is merged on top in every case.
    pub fn resolve(explicit: Option<InteropConfig>) -> Result<Self> {
        let mut config = match explicit {
            Some(config) => config,
            None => match std::env::var(ENV_CONFIG) {
                Ok(path) if !path.trim().is_empty() => Self::load(Path::new(path.trim()))?,
                _ => Self::default(),
            },
        };

        if let Ok(list) = std::env::var(ENV_DISABLE) {
            for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let interop: InteropType = name.parse().map_err(|e: String| {
                    InteropError::Configuration(format!("{}: {}", ENV_DISABLE, e))
                })?;
                if !config.disabled_interops.contains(&interop) {
                    tracing::info!("Interop {} disabled via {}", interop, ENV_DISABLE);
                    config.disabled_interops.push(interop);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.cache_capacity == 0, "cache_capacity"),
            (self.max_import_attempts_per_second == 0, "max_import_attempts_per_second"),
            (self.fence_timeout_ms == 0, "fence_timeout_ms"),
            (self.drain_timeout_ms == 0, "drain_timeout_ms"),
            (self.dispatch_timeout_ms == 0, "dispatch_timeout_ms"),
        ];
        if let Some((_, field)) = checks.iter().find(|(zero, _)| *zero) {
            return Err(InteropError::Configuration(format!(
                "{} must be greater than zero",
                field
            )));
        }
        Ok(())
    }

    pub fn is_disabled(&self, interop: InteropType) -> bool {
        self.disabled_interops.contains(&interop)
    }

    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

/// Pick a renderer: the preferred one if allowed, else the first allowed.
pub fn select_renderer<'a>(allowed: &'a [String], preferred: Option<&str>) -> Option<&'a str> {
    if let Some(wanted) = preferred {
        if let Some(hit) = allowed.iter().find(|r| r.as_str() == wanted) {
            return Some(hit.as_str());
        }
        tracing::debug!("Preferred renderer '{}' not allowed for this stream", wanted);
    }
    allowed.first().map(String::as_str)
}
