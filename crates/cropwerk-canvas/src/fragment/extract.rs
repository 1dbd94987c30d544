// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edge-aware extraction — crop a detector box out of a page, padding only the
// sides where the box cuts through content.

use image::{Rgba, RgbaImage, imageops};
use imageproc::rect::Rect;
use tracing::{debug, instrument};

use super::ink::{EDGE_INK_THRESHOLD, block_has_ink};
use crate::geometry::{Sides, pad_rect};

/// Depth, in pixels, of the border band inspected on each side.
pub const EDGE_BAND_DEPTH: u32 = 2;

/// Opaque white, the background of every canvas in the pipeline.
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Which sides of an unpadded region have ink in their border band.
pub type EdgeInk = Sides<bool>;

/// Result of extracting one box from a page.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The detector box in page pixels.
    pub box_rect: Rect,
    /// The box after edge-aware padding, clamped to the page.
    pub padded_rect: Rect,
    /// Border-band scan of the unpadded region.
    pub edge_ink: EdgeInk,
    /// Pixels of `padded_rect`, flattened onto white.
    pub image: RgbaImage,
}

/// Scan a thin band along each border of `region` for ink.
pub fn scan_edge_ink(region: &RgbaImage) -> EdgeInk {
    let (w, h) = region.dimensions();
    if w == 0 || h == 0 {
        return Sides::all(false);
    }
    let dx = EDGE_BAND_DEPTH.min(w);
    let dy = EDGE_BAND_DEPTH.min(h);

    Sides {
        top: block_has_ink(region, 0, 0, w, dy, EDGE_INK_THRESHOLD),
        right: block_has_ink(region, w - dx, 0, w, h, EDGE_INK_THRESHOLD),
        bottom: block_has_ink(region, 0, h - dy, w, h, EDGE_INK_THRESHOLD),
        left: block_has_ink(region, 0, 0, dx, h, EDGE_INK_THRESHOLD),
    }
}

/// Extract `box_rect` from `page`.
///
/// The unpadded region is scanned first: sides whose border band holds ink
/// get `crop_padding` extra pixels, clean sides get none. The padded rectangle
/// is clamped to the page and copied into a new buffer.
#[instrument(skip(page), fields(
    x = box_rect.left(),
    y = box_rect.top(),
    w = box_rect.width(),
    h = box_rect.height()
))]
pub fn extract_region(page: &RgbaImage, box_rect: Rect, crop_padding: u32) -> Extraction {
    let unpadded = crop_rect(page, box_rect);
    let edge_ink = scan_edge_ink(&unpadded);
    let padding = edge_ink.map(|ink| if ink { crop_padding } else { 0 });
    let padded_rect = pad_rect(box_rect, padding, page.width(), page.height());

    debug!(
        ?edge_ink,
        padded_w = padded_rect.width(),
        padded_h = padded_rect.height(),
        "edge-aware padding applied"
    );

    Extraction {
        box_rect,
        padded_rect,
        edge_ink,
        image: flatten_on_white(&crop_rect(page, padded_rect)),
    }
}

/// Copy the pixels under `rect` (which must lie inside `img`).
pub fn crop_rect(img: &RgbaImage, rect: Rect) -> RgbaImage {
    imageops::crop_imm(
        img,
        rect.left().max(0) as u32,
        rect.top().max(0) as u32,
        rect.width(),
        rect.height(),
    )
    .to_image()
}

/// A blank opaque white canvas.
pub fn white_canvas(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, WHITE)
}

/// Composite `img` over white so every later stage sees opaque pixels.
pub fn flatten_on_white(img: &RgbaImage) -> RgbaImage {
    let mut canvas = white_canvas(img.width(), img.height());
    imageops::overlay(&mut canvas, img, 0, 0);
    canvas
}
