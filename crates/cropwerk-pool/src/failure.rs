// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failure classification for finished tasks.
//
// The pool performs no retries. Callers use the classification to decide
// whether a failed question is the input's fault (skip it), the machinery's
// fault (retry or alert), or never ran at all.

use cropwerk_core::error::CropwerkError;
use cropwerk_core::types::FailureKind;

/// Classify a `CropwerkError` into a `FailureKind`.
pub fn classify_error(err: &CropwerkError) -> FailureKind {
    match err {
        // Input: the question's own data could not be composited
        CropwerkError::Geometry(_) => FailureKind::Input,
        CropwerkError::Decode(_) => FailureKind::Input,
        CropwerkError::Compositing(_) => FailureKind::Input,
        CropwerkError::Encode(_) => FailureKind::Input,
        CropwerkError::Config(_) => FailureKind::Input,
        CropwerkError::Serialization(_) => FailureKind::Input,

        // Systemic: a worker died underneath the task
        CropwerkError::Pool(_) => FailureKind::Systemic,

        CropwerkError::Cancelled => FailureKind::Cancelled,

        // IO errors depend on the kind
        CropwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::InvalidData
            | std::io::ErrorKind::UnexpectedEof => FailureKind::Input,
            _ => FailureKind::Systemic,
        },
    }
}
