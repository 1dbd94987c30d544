// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fragments — pixel regions extracted from a page, and the ink heuristics
// used to pad and trim them.

pub mod extract;
pub mod ink;
pub mod trim;

use image::RgbaImage;
use image::imageops;

pub use extract::{EdgeInk, Extraction, extract_region, scan_edge_ink};
pub use trim::{TrimPolicy, TrimRect, trim_rect};

/// An extracted region together with the part of it worth keeping.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Padded pixels, flattened onto white.
    pub image: RgbaImage,
    /// Region to keep, relative to `image`.
    pub trim: TrimRect,
    /// Left edge of the kept region, measured from the fragment origin.
    /// Sibling fragments are aligned on the smallest offset.
    pub ink_offset_x: u32,
}

impl Fragment {
    /// Wrap an extracted image and trim it under `policy`.
    pub fn new(image: RgbaImage, policy: TrimPolicy) -> Self {
        let trim = trim_rect(&image, policy);
        Self {
            ink_offset_x: trim.x,
            image,
            trim,
        }
    }

    /// A fragment that keeps every pixel.
    pub fn untrimmed(image: RgbaImage) -> Self {
        let trim = TrimRect::full(&image);
        Self {
            image,
            trim,
            ink_offset_x: 0,
        }
    }

    /// Copy out the kept region.
    pub fn trimmed(&self) -> RgbaImage {
        imageops::crop_imm(
            &self.image,
            self.trim.x,
            self.trim.y,
            self.trim.width,
            self.trim.height,
        )
        .to_image()
    }
}
