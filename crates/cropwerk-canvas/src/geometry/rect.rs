// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversion from normalized detector boxes to pixel rectangles.

use cropwerk_core::error::{CropwerkError, Result};
use cropwerk_core::types::{NORMALIZED_SCALE, NormalizedBox};
use imageproc::rect::Rect;

/// A value for each side of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sides<T> {
    pub top: T,
    pub right: T,
    pub bottom: T,
    pub left: T,
}

impl<T: Copy> Sides<T> {
    pub fn all(value: T) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub fn map<U>(self, f: impl Fn(T) -> U) -> Sides<U> {
        Sides {
            top: f(self.top),
            right: f(self.right),
            bottom: f(self.bottom),
            left: f(self.left),
        }
    }
}

/// Convert a normalized box to a pixel rectangle on a `width` x `height`
/// image.
///
/// The near edges are floored and the far edges ceiled so the rectangle never
/// loses a partially covered pixel; the result is clamped to the image.
pub fn to_pixel_rect(b: &NormalizedBox, width: u32, height: u32) -> Result<Rect> {
    let coords = [b.ymin, b.xmin, b.ymax, b.xmax];
    if coords.iter().any(|c| !c.is_finite()) {
        return Err(CropwerkError::Geometry(format!(
            "non-finite box coordinates {coords:?}"
        )));
    }
    if width == 0 || height == 0 {
        return Err(CropwerkError::Geometry(format!(
            "page has no pixels ({width}x{height})"
        )));
    }

    let to_px = |v: f64, extent: u32| v * extent as f64 / NORMALIZED_SCALE;

    let x0 = (to_px(b.xmin, width).floor() as i64).clamp(0, width as i64);
    let y0 = (to_px(b.ymin, height).floor() as i64).clamp(0, height as i64);
    let x1 = (to_px(b.xmax, width).ceil() as i64).clamp(0, width as i64);
    let y1 = (to_px(b.ymax, height).ceil() as i64).clamp(0, height as i64);

    if x1 <= x0 || y1 <= y0 {
        return Err(CropwerkError::Geometry(format!(
            "box {coords:?} is empty on a {width}x{height} page"
        )));
    }

    Ok(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

/// Grow `rect` by `padding` on each side, clamped to a `width` x `height`
/// image.
pub fn pad_rect(rect: Rect, padding: Sides<u32>, width: u32, height: u32) -> Rect {
    let x0 = (rect.left() as i64 - padding.left as i64).max(0);
    let y0 = (rect.top() as i64 - padding.top as i64).max(0);
    let x1 = (rect.right() as i64 + 1 + padding.right as i64).min(width as i64);
    let y1 = (rect.bottom() as i64 + 1 + padding.bottom as i64).min(height as i64);

    Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0).max(1) as u32, (y1 - y0).max(1) as u32)
}
