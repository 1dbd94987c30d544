// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compositing — stitching fragments and parts, aligning widths, and the
// per-question pipeline built on top of them.

pub mod align;
pub mod pipeline;
pub mod preview;
pub mod stitch;

pub use align::{align_to_width, file_target_width};
pub use pipeline::{OutputOptions, process_logical_question};
pub use preview::{DebugPreview, generate_debug_preview};
pub use stitch::{FRAGMENT_GAP, stitch_continuation, stitch_fragments};
