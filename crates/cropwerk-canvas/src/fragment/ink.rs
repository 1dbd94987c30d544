// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ink detection — which pixels count as visible content.

use image::{Rgba, RgbaImage};

/// Pixels at or below this alpha are treated as empty.
pub const ALPHA_THRESHOLD: u8 = 10;

/// Channel threshold for the edge-ink scan on unpadded regions.
pub const EDGE_INK_THRESHOLD: u8 = 230;

/// Channel threshold for whitespace trimming. Slightly looser than the edge
/// scan so faint scan noise near the border is still peeled.
pub const TRIM_INK_THRESHOLD: u8 = 235;

/// A pixel is ink when it is visible and any channel is darker than
/// `threshold`.
#[inline]
pub fn is_ink(pixel: &Rgba<u8>, threshold: u8) -> bool {
    let [r, g, b, a] = pixel.0;
    a > ALPHA_THRESHOLD && (r < threshold || g < threshold || b < threshold)
}

/// Whether any pixel in `x0..x1` of row `y` is ink.
pub fn row_has_ink(img: &RgbaImage, y: u32, x0: u32, x1: u32, threshold: u8) -> bool {
    (x0..x1).any(|x| is_ink(img.get_pixel(x, y), threshold))
}

/// Whether any pixel in `y0..y1` of column `x` is ink.
pub fn column_has_ink(img: &RgbaImage, x: u32, y0: u32, y1: u32, threshold: u8) -> bool {
    (y0..y1).any(|y| is_ink(img.get_pixel(x, y), threshold))
}

/// Whether any pixel in the half-open block `[x0, x1) x [y0, y1)` is ink.
pub fn block_has_ink(img: &RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32, threshold: u8) -> bool {
    (y0..y1).any(|y| row_has_ink(img, y, x0, x1, threshold))
}
