// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Debug preview — the intermediate stages of one box, for inspection tooling.

use cropwerk_core::config::CropSettings;
use cropwerk_core::error::Result;
use cropwerk_core::types::{NormalizedBox, Page};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::{info, instrument};

use crate::compose::align::align_to_width;
use crate::encode::decode_image;
use crate::fragment::extract::{EdgeInk, crop_rect, flatten_on_white};
use crate::fragment::{Fragment, TrimPolicy, TrimRect, extract_region};
use crate::geometry::to_pixel_rect;

const BOX_OUTLINE: Rgba<u8> = Rgba([0, 90, 255, 255]);
const TRIM_OUTLINE: Rgba<u8> = Rgba([230, 0, 40, 255]);

/// The four stages of compositing one box.
#[derive(Debug, Clone)]
pub struct DebugPreview {
    /// Stage 1: the unpadded box.
    pub raw: RgbaImage,
    /// Stage 2: after edge-aware padding.
    pub padded: RgbaImage,
    /// Stage 3: after unlimited trimming.
    pub trimmed: RgbaImage,
    /// Stage 4: on a canvas as wide as the box, with canvas padding.
    pub aligned: RgbaImage,
    /// Stage 2 with the box (blue) and trim (red) rectangles drawn on it.
    pub annotated: RgbaImage,
    pub box_rect: Rect,
    pub padded_rect: Rect,
    pub edge_ink: EdgeInk,
    pub trim: TrimRect,
}

/// Run one box through every stage and keep each intermediate image.
#[instrument(skip(page, settings), fields(page = page.page_number, file = %page.file_id))]
pub fn generate_debug_preview(
    b: &NormalizedBox,
    page: &Page,
    settings: &CropSettings,
) -> Result<DebugPreview> {
    let page_img = decode_image(&page.image)?;
    let box_rect = to_pixel_rect(b, page_img.width(), page_img.height())?;

    let raw = flatten_on_white(&crop_rect(&page_img, box_rect));
    let extraction = extract_region(&page_img, box_rect, settings.crop_padding);
    let fragment = Fragment::new(extraction.image.clone(), TrimPolicy::Unlimited);
    let trimmed = fragment.trimmed();
    let aligned = align_to_width(&trimmed, box_rect.width(), settings.canvas_padding);

    let mut annotated = extraction.image.clone();
    let local_box = Rect::at(
        box_rect.left() - extraction.padded_rect.left(),
        box_rect.top() - extraction.padded_rect.top(),
    )
    .of_size(box_rect.width(), box_rect.height());
    draw_hollow_rect_mut(&mut annotated, local_box, BOX_OUTLINE);
    draw_hollow_rect_mut(
        &mut annotated,
        Rect::at(fragment.trim.x as i32, fragment.trim.y as i32)
            .of_size(fragment.trim.width, fragment.trim.height),
        TRIM_OUTLINE,
    );

    info!(
        box_w = box_rect.width(),
        box_h = box_rect.height(),
        padded_w = extraction.padded_rect.width(),
        padded_h = extraction.padded_rect.height(),
        trimmed_w = trimmed.width(),
        trimmed_h = trimmed.height(),
        "debug preview generated"
    );

    Ok(DebugPreview {
        raw,
        padded: extraction.image,
        trimmed,
        aligned,
        annotated,
        box_rect,
        padded_rect: extraction.padded_rect,
        edge_ink: extraction.edge_ink,
        trim: fragment.trim,
    })
}
