// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Logging setup for binaries, benchmarks and tests that use this crate.
//!
//! The library itself only emits `tracing` events; nothing is printed until a
//! subscriber is installed. [`init`] installs one that writes to stderr.
//!
//! - Filters come from the `VELO_WAITABLE_LOG` environment variable using
//!   `EnvFilter` syntax, e.g. `velo_waitable=trace`. The default level is
//!   `info`.
//! - Output is compact and human readable unless
//!   `VELO_WAITABLE_LOGGING_JSONL=1`, which switches to one JSON object per
//!   line.

use std::sync::Once;

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// ENV used to set the log filter
pub const FILTER_ENV: &str = "VELO_WAITABLE_LOG";

/// ENV enabling JSONL output
pub const JSONL_ENV: &str = "VELO_WAITABLE_LOGGING_JSONL";

/// Default log level
const DEFAULT_FILTER_LEVEL: &str = "info";

/// Once instance to ensure the logger is only initialized once
static INIT: Once = Once::new();

/// Initialize the logger
pub fn init() {
    INIT.call_once(setup_logging);
}

fn jsonl_logging_enabled() -> bool {
    std::env::var(JSONL_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE"))
        .unwrap_or(false)
}

fn filters() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(
            DEFAULT_FILTER_LEVEL
                .parse()
                .unwrap_or_else(|_| tracing::level_filters::LevelFilter::INFO.into()),
        )
        .with_env_var(FILTER_ENV)
        .from_env_lossy()
}

fn setup_logging() {
    let filter_layer = filters();
    // try_init: another subscriber may already be installed (e.g. by the host
    // application); keep theirs.
    let result = if jsonl_logging_enabled() {
        let l = fmt::layer()
            .with_ansi(false)
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);
        tracing_subscriber::registry().with(l).try_init()
    } else {
        let l = fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);
        tracing_subscriber::registry().with(l).try_init()
    };
    if let Err(err) = result {
        tracing::debug!(error = %err, "tracing subscriber already installed");
    }
}
