// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide configuration for waitable events.
//!
//! Configuration sources in priority order (lowest to highest):
//! 1. Code defaults
//! 2. TOML file from the `VELO_WAITABLE_CONFIG_PATH` environment variable
//! 3. Environment variables (`VELO_WAITABLE_*` prefixed)
//!
//! Example:
//! ```toml
//! track_blocking_calls = true
//! slow_wait_warn_ms = 5000
//! ```
//!
//! The configuration only affects diagnostics; signaling and waiting behave
//! the same under every setting.

use std::sync::OnceLock;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use validator::{Validate, ValidationErrors};

/// ENV pointing at an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "VELO_WAITABLE_CONFIG_PATH";

/// Prefix of environment overrides, e.g. `VELO_WAITABLE_TRACK_BLOCKING_CALLS`
pub const ENV_PREFIX: &str = "VELO_WAITABLE_";

static CURRENT: OnceLock<WaitableConfig> = OnceLock::new();

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the expected shape.
    #[error("Failed to extract configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    /// Values parsed but are out of range.
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// [`install`] ran after the configuration was fixed.
    #[error("Configuration already installed for this process")]
    AlreadyInstalled,
}

/// Diagnostics knobs for blocking waits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct WaitableConfig {
    /// Record blocked threads in [`diagnostics`](crate::diagnostics).
    #[serde(default = "default_track_blocking_calls")]
    pub track_blocking_calls: bool,

    /// Warn when a single blocking wait lasts longer than this many
    /// milliseconds. None = never warn.
    #[validate(range(min = 1))]
    #[serde(default)]
    pub slow_wait_warn_ms: Option<u64>,
}

fn default_track_blocking_calls() -> bool {
    true
}

impl Default for WaitableConfig {
    fn default() -> Self {
        Self {
            track_blocking_calls: default_track_blocking_calls(),
            slow_wait_warn_ms: None,
        }
    }
}

impl WaitableConfig {
    /// Create a Figment configuration with all sources merged.
    pub fn figment() -> Figment {
        let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_default();

        Figment::new()
            .merge(Serialized::defaults(WaitableConfig::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).map(|k| k.as_str().to_lowercase().into()))
    }

    /// Load configuration from default figment (env and files).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment())
    }

    /// Extract configuration from any provider.
    ///
    /// # Example
    /// ```rust,ignore
    /// let config = WaitableConfig::extract_from(
    ///     WaitableConfig::figment().merge(("slow_wait_warn_ms", 250u64)),
    /// )?;
    /// ```
    pub fn extract_from<T: Provider>(provider: T) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(provider)
            .extract()
            .map_err(|e| ConfigError::Extraction(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Install `config` for the rest of the process.
///
/// Must run before the first blocking wait; afterwards the lazily loaded
/// configuration is already fixed and this returns
/// [`ConfigError::AlreadyInstalled`].
pub fn install(config: WaitableConfig) -> Result<(), ConfigError> {
    config.validate()?;
    CURRENT
        .set(config)
        .map_err(|_| ConfigError::AlreadyInstalled)
}

/// The active configuration, loaded from the environment on first use.
pub fn current() -> &'static WaitableConfig {
    CURRENT.get_or_init(|| match WaitableConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "invalid waitable event configuration; using defaults");
            WaitableConfig::default()
        }
    })
}
