// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fragment stitching — stacking the boxes of one detection, and stacking the
// parts of a question that continues across a page or column break.

use cropwerk_core::error::{CropwerkError, Result};
use image::RgbaImage;
use tracing::debug;

use crate::fragment::Fragment;
use crate::fragment::extract::white_canvas;

/// Vertical gap between stacked fragments of one detection.
pub const FRAGMENT_GAP: u32 = 10;

/// Stack the trimmed fragments of one detection.
///
/// Each fragment keeps its indentation relative to the least indented one:
/// its kept region is drawn at `ink_offset_x - min(ink_offset_x)`.
pub fn stitch_fragments(fragments: &[Fragment]) -> Result<RgbaImage> {
    let min_offset = fragments
        .iter()
        .map(|f| f.ink_offset_x)
        .min()
        .ok_or_else(|| CropwerkError::Compositing("no fragments to stitch".into()))?;

    let mut width = 0u32;
    let mut height = 0u32;
    for (i, fragment) in fragments.iter().enumerate() {
        let right = (fragment.ink_offset_x - min_offset)
            .checked_add(fragment.trim.width)
            .ok_or_else(|| overflow("fragment width"))?;
        width = width.max(right);
        let gap = if i == 0 { 0 } else { FRAGMENT_GAP };
        height = height
            .checked_add(gap)
            .and_then(|h| h.checked_add(fragment.trim.height))
            .ok_or_else(|| overflow("fragment stack height"))?;
    }

    let mut canvas = white_canvas(width, height);
    let mut cursor = 0u32;
    for fragment in fragments {
        let kept = fragment.trimmed();
        blend_darken(&mut canvas, &kept, fragment.ink_offset_x - min_offset, cursor);
        cursor += kept.height() + FRAGMENT_GAP;
    }

    debug!(count = fragments.len(), width, height, "fragments stitched");
    Ok(canvas)
}

/// Stack the parts of a continued question, overlapping neighbours by
/// `merge_overlap` pixels to absorb the seam.
///
/// The overlap at each seam is capped by the heights of the two parts it
/// joins. The result is `max(width)` wide and `sum(height) - overlaps` tall.
pub fn stitch_continuation(parts: &[RgbaImage], merge_overlap: u32) -> Result<RgbaImage> {
    let first = parts
        .first()
        .ok_or_else(|| CropwerkError::Compositing("no parts to stitch".into()))?;
    if parts.len() == 1 {
        return Ok(first.clone());
    }

    let overlaps: Vec<u32> = parts
        .windows(2)
        .map(|pair| merge_overlap.min(pair[0].height()).min(pair[1].height()))
        .collect();

    let width = parts.iter().map(|p| p.width()).max().unwrap_or(0);
    let total: u64 = parts.iter().map(|p| p.height() as u64).sum::<u64>()
        - overlaps.iter().map(|&o| o as u64).sum::<u64>();
    let height = u32::try_from(total).map_err(|_| overflow("continuation height"))?;

    let mut canvas = white_canvas(width, height);
    let mut cursor = 0u32;
    for (i, part) in parts.iter().enumerate() {
        blend_darken(&mut canvas, part, 0, cursor);
        if let Some(&overlap) = overlaps.get(i) {
            cursor += part.height() - overlap;
        }
    }

    debug!(parts = parts.len(), merge_overlap, width, height, "continuation stitched");
    Ok(canvas)
}

/// Draw `src` onto `canvas` at (`x`, `y`), keeping the darker value of each
/// channel so ink from either image survives where they overlap. Pixels
/// falling outside the canvas are skipped.
pub fn blend_darken(canvas: &mut RgbaImage, src: &RgbaImage, x: u32, y: u32) {
    let (cw, ch) = canvas.dimensions();
    for (sx, sy, pixel) in src.enumerate_pixels() {
        let (Some(cx), Some(cy)) = (x.checked_add(sx), y.checked_add(sy)) else {
            continue;
        };
        if cx >= cw || cy >= ch {
            continue;
        }
        let dst = canvas.get_pixel_mut(cx, cy);
        for c in 0..3 {
            dst.0[c] = dst.0[c].min(pixel.0[c]);
        }
        dst.0[3] = dst.0[3].max(pixel.0[3]);
    }
}

fn overflow(what: &str) -> CropwerkError {
    CropwerkError::Compositing(format!("{what} exceeds canvas limits"))
}
