// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Box normalization and nested-duplicate removal, applied per detection.

use cropwerk_core::types::{Boxes, NormalizedBox};
use tracing::debug;

/// Slack, in normalized units, when testing whether one box contains another.
pub const CONTAINMENT_TOLERANCE: f64 = 5.0;

/// Flatten a detection's boxes and drop nested duplicates.
pub fn normalize_boxes(boxes: &Boxes) -> Vec<NormalizedBox> {
    dedupe_boxes(&boxes.to_vec())
}

/// Drop every box contained in another box of the same list.
///
/// When two boxes contain each other (equal within tolerance) the one with
/// the lower index survives. Input order is preserved, and applying the
/// function to its own output changes nothing.
pub fn dedupe_boxes(boxes: &[NormalizedBox]) -> Vec<NormalizedBox> {
    let kept: Vec<NormalizedBox> = boxes
        .iter()
        .enumerate()
        .filter(|&(i, candidate)| {
            !boxes.iter().enumerate().any(|(j, other)| {
                if i == j || !candidate.is_inside(other, CONTAINMENT_TOLERANCE) {
                    return false;
                }
                let mutual = other.is_inside(candidate, CONTAINMENT_TOLERANCE);
                !mutual || j < i
            })
        })
        .map(|(_, b)| *b)
        .collect();

    if kept.len() != boxes.len() {
        debug!(before = boxes.len(), after = kept.len(), "nested boxes removed");
    }
    kept
}
