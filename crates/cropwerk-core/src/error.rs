// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Cropwerk.

use thiserror::Error;

/// Top-level error type for all Cropwerk operations.
#[derive(Debug, Error)]
pub enum CropwerkError {
    // -- Data errors --
    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("failed to decode source image: {0}")]
    Decode(String),

    #[error("compositing failed: {0}")]
    Compositing(String),

    #[error("image encoding failed: {0}")]
    Encode(String),

    // -- Execution errors --
    #[error("worker failure: {0}")]
    Pool(String),

    #[error("task cancelled before dispatch")]
    Cancelled,

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CropwerkError>;
