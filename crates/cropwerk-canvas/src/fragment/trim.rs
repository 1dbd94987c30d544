// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Whitespace trimming under two policies: unlimited (bounded only by a safety
// margin) and depth-limited (bounded by a fixed number of pixels per side).
// Unlimited never peels less than depth-limited would.

use image::RgbaImage;
use tracing::trace;

use super::ink::{TRIM_INK_THRESHOLD, column_has_ink, row_has_ink};
use crate::geometry::Sides;

/// Maximum pixels peeled from each side on the final compositing path.
pub const TRIM_DEPTH_LIMIT: u32 = 50;

/// Fraction of an axis the unlimited policy may peel from each side, when
/// that exceeds [`TRIM_DEPTH_LIMIT`].
pub const SAFETY_MARGIN_RATIO: f64 = 0.15;

/// How far whitespace may be removed from each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimPolicy {
    /// Peel all whitespace, up to 15% of the dimension or
    /// [`TRIM_DEPTH_LIMIT`] per side, whichever is larger.
    Unlimited,
    /// Peel at most this many pixels per side, keeping a uniform minimum
    /// margin across sibling images.
    DepthLimited(u32),
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self::DepthLimited(TRIM_DEPTH_LIMIT)
    }
}

/// Rectangle kept after trimming, relative to the fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TrimRect {
    /// The whole of `img`.
    pub fn full(img: &RgbaImage) -> Self {
        Self {
            x: 0,
            y: 0,
            width: img.width(),
            height: img.height(),
        }
    }
}

/// Whitespace depth on each side of `img`, or `None` when it has no ink.
pub fn whitespace_depths(img: &RgbaImage) -> Option<Sides<u32>> {
    let (w, h) = img.dimensions();
    let top = (0..h).find(|&y| row_has_ink(img, y, 0, w, TRIM_INK_THRESHOLD))?;
    let bottom = (top..h)
        .rev()
        .find(|&y| row_has_ink(img, y, 0, w, TRIM_INK_THRESHOLD))
        .unwrap_or(top);
    // Rows outside [top, bottom] are blank, so columns only need that band.
    let left = (0..w)
        .find(|&x| column_has_ink(img, x, top, bottom + 1, TRIM_INK_THRESHOLD))
        .unwrap_or(0);
    let right = (left..w)
        .rev()
        .find(|&x| column_has_ink(img, x, top, bottom + 1, TRIM_INK_THRESHOLD))
        .unwrap_or(left);

    Some(Sides {
        top,
        right: w - 1 - right,
        bottom: h - 1 - bottom,
        left,
    })
}

/// Per-side peel bound of the unlimited policy on an axis of `len` pixels.
fn safety_margin(len: u32) -> u32 {
    ((f64::from(len) * SAFETY_MARGIN_RATIO).floor() as u32).max(TRIM_DEPTH_LIMIT)
}

/// Compute the rectangle to keep from `img` under `policy`.
///
/// A fragment without any ink is returned whole.
pub fn trim_rect(img: &RgbaImage, policy: TrimPolicy) -> TrimRect {
    let Some(depths) = whitespace_depths(img) else {
        trace!("fragment has no ink; keeping it whole");
        return TrimRect::full(img);
    };
    let (w, h) = img.dimensions();

    let (max_x, max_y) = match policy {
        TrimPolicy::Unlimited => (safety_margin(w), safety_margin(h)),
        TrimPolicy::DepthLimited(limit) => (limit, limit),
    };

    let peel = Sides {
        top: depths.top.min(max_y),
        right: depths.right.min(max_x),
        bottom: depths.bottom.min(max_y),
        left: depths.left.min(max_x),
    };

    // Ink exists, so the peeled sides never meet.
    let rect = TrimRect {
        x: peel.left,
        y: peel.top,
        width: w - peel.left - peel.right,
        height: h - peel.top - peel.bottom,
    };
    trace!(?policy, ?depths, ?rect, "trim computed");
    rect
}
