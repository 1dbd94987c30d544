// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Width alignment — every question of a file is padded to a shared width so
// the set reads as one visually consistent column.

use cropwerk_core::config::CanvasPadding;
use cropwerk_core::types::Page;
use image::RgbaImage;
use tracing::debug;

use crate::compose::stitch::blend_darken;
use crate::fragment::extract::white_canvas;
use crate::geometry::to_pixel_rect;

/// Widest detector box, in page pixels, across all detections of a file.
///
/// Computed from the declared page dimensions, so no page is decoded.
/// Boxes that do not map to a pixel rectangle are ignored.
pub fn file_target_width<'a>(pages: impl IntoIterator<Item = &'a Page>) -> u32 {
    let target = pages
        .into_iter()
        .flat_map(|page| {
            page.detections
                .iter()
                .flat_map(|det| det.boxes.to_vec())
                .filter_map(|b| to_pixel_rect(&b, page.width, page.height).ok())
                .map(|rect| rect.width())
        })
        .max()
        .unwrap_or(0);
    debug!(target, "file target width computed");
    target
}

/// Place `content` left-aligned on a white canvas of width
/// `max(content width, target_width)` plus the horizontal padding. Height is
/// the content height plus the vertical padding.
pub fn align_to_width(content: &RgbaImage, target_width: u32, padding: CanvasPadding) -> RgbaImage {
    let width = content.width().max(target_width) + padding.horizontal();
    let height = content.height() + padding.vertical();
    let mut canvas = white_canvas(width, height);
    blend_darken(&mut canvas, content, padding.left, padding.top);
    canvas
}
