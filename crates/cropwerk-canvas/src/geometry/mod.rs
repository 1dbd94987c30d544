// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometry — normalized box deduplication and conversion to pixel rectangles.

pub mod dedupe;
pub mod rect;

pub use dedupe::{CONTAINMENT_TOLERANCE, dedupe_boxes, normalize_boxes};
pub use rect::{Sides, pad_rect, to_pixel_rect};
