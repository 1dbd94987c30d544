// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cropwerk-canvas — Compositing pipeline for exam question images.
//
// Turns detector boxes on rendered pages into clean question images: box
// deduplication, edge-aware extraction, whitespace trimming, fragment and
// continuation stitching, file-wide width alignment, and encoding.

pub mod compose;
pub mod encode;
pub mod fragment;
pub mod geometry;
pub mod group;

// Re-export the entry points so callers can use `cropwerk_canvas::process_logical_question` etc.
pub use compose::pipeline::{OutputOptions, process_logical_question};
pub use compose::preview::{DebugPreview, generate_debug_preview};
pub use compose::align::file_target_width;
pub use group::group_questions;
