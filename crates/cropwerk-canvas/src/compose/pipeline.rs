// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-question compositor — decode, extract, trim, stitch, align, encode.
//
// Each call owns every buffer it touches, so any number of calls can run in
// parallel without coordination.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use cropwerk_core::config::{CropSettings, OutputFormat, PipelineConfig};
use cropwerk_core::error::Result;
use cropwerk_core::types::{LogicalQuestion, QuestionImage, QuestionPart};
use image::RgbaImage;
use tracing::{debug, info, instrument, warn};

use crate::compose::align::align_to_width;
use crate::compose::stitch::{stitch_continuation, stitch_fragments};
use crate::encode::{decode_image, encode_image, hash_bytes};
use crate::fragment::{Fragment, TrimPolicy, extract_region};
use crate::geometry::{normalize_boxes, to_pixel_rect};

/// Output choices that do not affect the pixels of the final image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputOptions {
    pub format: OutputFormat,
    /// Also encode the untrimmed stack for before/after comparison.
    pub keep_original: bool,
}

impl From<&PipelineConfig> for OutputOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            format: config.output_format,
            keep_original: config.keep_original,
        }
    }
}

/// Composite one logical question into its final image.
///
/// Returns `Ok(None)` when no part of the question has a usable box; such
/// questions are dropped, not failed. Decode, compositing, and encoding
/// failures are returned as errors for the caller to retry or skip.
#[instrument(skip_all, fields(
    question = %question.id,
    file = %question.file_id,
    parts = question.parts.len(),
    target_width
))]
pub fn process_logical_question(
    question: &LogicalQuestion,
    settings: &CropSettings,
    target_width: Option<u32>,
    output: &OutputOptions,
) -> Result<Option<QuestionImage>> {
    let mut decoded: HashMap<u32, RgbaImage> = HashMap::new();
    let mut finals = Vec::with_capacity(question.parts.len());
    let mut originals = Vec::new();

    for part in &question.parts {
        let page_img = match decoded.entry(part.page.page_number) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(decode_page(part)?),
        };

        let Some(composed) = compose_part(part, page_img, settings, output.keep_original)? else {
            continue;
        };
        finals.push(composed.trimmed);
        if let Some(original) = composed.original {
            originals.push(original);
        }
    }

    if finals.is_empty() {
        warn!("question has no usable boxes; dropping it");
        return Ok(None);
    }

    let stitched = stitch_continuation(&finals, settings.merge_overlap)?;
    let aligned = align_to_width(
        &stitched,
        target_width.unwrap_or(0),
        settings.canvas_padding,
    );
    let data = encode_image(&aligned, output.format)?;

    let original = if output.keep_original && !originals.is_empty() {
        let stack = stitch_continuation(&originals, settings.merge_overlap)?;
        Some(encode_image(&stack, output.format)?)
    } else {
        None
    };

    info!(
        width = aligned.width(),
        height = aligned.height(),
        bytes = data.len(),
        "question composited"
    );

    Ok(Some(QuestionImage {
        id: question.id.clone(),
        file_id: question.file_id.clone(),
        page_number: question.page_number(),
        width: aligned.width(),
        height: aligned.height(),
        format: output.format.image_format(),
        digest: hash_bytes(&data),
        data,
        original,
    }))
}

/// The composed pixels of one part.
struct ComposedPart {
    trimmed: RgbaImage,
    original: Option<RgbaImage>,
}

fn decode_page(part: &QuestionPart) -> Result<RgbaImage> {
    let page = &part.page;
    let img = decode_image(&page.image).map_err(|err| {
        warn!(page = page.page_number, error = %err, "page decode failed");
        err
    })?;
    if img.dimensions() != (page.width, page.height) {
        warn!(
            page = page.page_number,
            declared_w = page.width,
            declared_h = page.height,
            actual_w = img.width(),
            actual_h = img.height(),
            "decoded page size differs from declared size; using decoded size"
        );
    }
    Ok(img)
}

/// Extract, trim, and stitch the boxes of one detection.
fn compose_part(
    part: &QuestionPart,
    page_img: &RgbaImage,
    settings: &CropSettings,
    keep_original: bool,
) -> Result<Option<ComposedPart>> {
    let boxes = normalize_boxes(&part.detection.boxes);
    let mut trimmed = Vec::with_capacity(boxes.len());
    let mut untrimmed = Vec::new();

    for b in &boxes {
        let rect = match to_pixel_rect(b, page_img.width(), page_img.height()) {
            Ok(rect) => rect,
            Err(err) => {
                warn!(
                    page = part.page.page_number,
                    index = part.index_in_page,
                    error = %err,
                    "skipping unusable box"
                );
                continue;
            }
        };
        let extraction = extract_region(page_img, rect, settings.crop_padding);
        if keep_original {
            untrimmed.push(Fragment::untrimmed(extraction.image.clone()));
        }
        trimmed.push(Fragment::new(extraction.image, TrimPolicy::default()));
    }

    if trimmed.is_empty() {
        return Ok(None);
    }
    debug!(
        page = part.page.page_number,
        fragments = trimmed.len(),
        "part extracted"
    );

    let trimmed = match trimmed.as_slice() {
        [single] => single.trimmed(),
        many => stitch_fragments(many)?,
    };
    let original = if keep_original {
        Some(stitch_fragments(&untrimmed)?)
    } else {
        None
    };

    Ok(Some(ComposedPart { trimmed, original }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropwerk_core::config::CanvasPadding;
    use cropwerk_core::error::CropwerkError;
    use cropwerk_core::types::{Boxes, Detection, NormalizedBox, Page};
    use image::Rgba;
    use std::sync::Arc;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    /// White page with black blocks at the given pixel rectangles.
    fn page_png(w: u32, h: u32, blocks: &[(u32, u32, u32, u32)]) -> Arc<[u8]> {
        let mut img = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        for &(x0, y0, x1, y1) in blocks {
            for y in y0..y1 {
                for x in x0..x1 {
                    img.put_pixel(x, y, BLACK);
                }
            }
        }
        Arc::from(encode_image(&img, OutputFormat::Png).expect("encode"))
    }

    fn page(number: u32, w: u32, h: u32, image: Arc<[u8]>) -> Arc<Page> {
        Arc::new(Page {
            file_id: "exam".into(),
            page_number: number,
            width: w,
            height: h,
            image,
            detections: Vec::new(),
        })
    }

    fn question(parts: Vec<(Arc<Page>, Detection)>) -> LogicalQuestion {
        LogicalQuestion {
            id: "3".into(),
            file_id: "exam".into(),
            parts: parts
                .into_iter()
                .enumerate()
                .map(|(i, (page, detection))| QuestionPart {
                    page,
                    detection,
                    index_in_page: i,
                })
                .collect(),
        }
    }

    fn settings(crop: u32, canvas: u32, overlap: u32) -> CropSettings {
        CropSettings {
            crop_padding: crop,
            canvas_padding: CanvasPadding::uniform(canvas),
            merge_overlap: overlap,
        }
    }

    fn decode(image: &QuestionImage) -> RgbaImage {
        decode_image(&image.data).expect("decode output")
    }

    #[test]
    fn single_box_produces_trimmed_aligned_image() {
        // 200x300 page, ink block x 40..160, y 60..120.
        let img = page_png(200, 300, &[(40, 60, 160, 120)]);
        let p = page(1, 200, 300, img);
        // Box covers x 20..180, y 30..150 with whitespace all around the ink.
        let det = Detection::normal(
            "3",
            Boxes::Single(NormalizedBox::new(100.0, 100.0, 500.0, 900.0)),
        );
        let q = question(vec![(p, det)]);

        let out = process_logical_question(&q, &settings(20, 10, 0), None, &OutputOptions::default())
            .expect("process")
            .expect("image");

        // No edge ink, so no padding: the 160x120 region trims to its ink.
        assert_eq!((out.width, out.height), (120 + 20, 60 + 20));
        let pixels = decode(&out);
        assert_eq!(pixels.dimensions(), (140, 80));
        assert_eq!(*pixels.get_pixel(10, 10), BLACK);
        assert_eq!(*pixels.get_pixel(9, 10), Rgba([255, 255, 255, 255]));
        assert_eq!(out.digest, hash_bytes(&out.data));
        assert_eq!(out.page_number, 1);
        assert!(out.original.is_none());
    }

    #[test]
    fn final_width_honours_file_target() {
        // 2000x3000 page, box [100,100,300,600].
        let img = page_png(2000, 3000, &[(400, 400, 800, 700)]);
        let p = page(1, 2000, 3000, img);
        let det = Detection::normal(
            "3",
            Boxes::Single(NormalizedBox::new(100.0, 100.0, 300.0, 600.0)),
        );
        let q = question(vec![(p, det)]);

        let out = process_logical_question(
            &q,
            &settings(20, 10, 0),
            Some(1500),
            &OutputOptions::default(),
        )
        .expect("process")
        .expect("image");
        assert_eq!(out.width, 1500 + 20);
    }

    #[test]
    fn continuation_parts_overlap() {
        let first = page(1, 100, 100, page_png(100, 100, &[(10, 10, 90, 90)]));
        let second = page(2, 100, 100, page_png(100, 100, &[(10, 10, 90, 50)]));
        // Boxes hug the ink exactly, so the edge scan pads every side.
        let b1 = Boxes::Single(NormalizedBox::new(100.0, 100.0, 900.0, 900.0));
        let b2 = Boxes::Single(NormalizedBox::new(100.0, 100.0, 500.0, 900.0));
        let q = question(vec![
            (first, Detection::normal("3", b1)),
            (second, Detection::continuation(b2)),
        ]);

        let out = process_logical_question(&q, &settings(0, 0, 20), None, &OutputOptions::default())
            .expect("process")
            .expect("image");
        assert_eq!(out.height, 80 + 40 - 20);
        assert_eq!(out.width, 80);
    }

    #[test]
    fn multi_box_detection_is_stacked() {
        // Two columns on one page: left x 10..40, right x 60..90.
        let img = page_png(100, 100, &[(10, 10, 40, 50), (60, 20, 90, 40)]);
        let p = page(1, 100, 100, img);
        let det = Detection::normal(
            "3",
            Boxes::Multi(vec![
                NormalizedBox::new(100.0, 100.0, 500.0, 400.0),
                NormalizedBox::new(200.0, 600.0, 400.0, 900.0),
            ]),
        );
        let q = question(vec![(p, det)]);

        let out = process_logical_question(&q, &settings(0, 0, 0), None, &OutputOptions::default())
            .expect("process")
            .expect("image");
        assert_eq!(out.width, 30);
        assert_eq!(out.height, 40 + 10 + 20);
    }

    #[test]
    fn unusable_boxes_drop_the_question() {
        let p = page(1, 100, 100, page_png(100, 100, &[]));
        let det = Detection::normal(
            "3",
            Boxes::Multi(vec![NormalizedBox::new(500.0, 500.0, 100.0, 100.0)]),
        );
        let q = question(vec![(p.clone(), det)]);
        let out = process_logical_question(&q, &settings(20, 10, 0), None, &OutputOptions::default())
            .expect("process");
        assert!(out.is_none());

        let empty = question(vec![(p, Detection::normal("3", Boxes::Multi(Vec::new())))]);
        assert!(
            process_logical_question(&empty, &CropSettings::default(), None, &OutputOptions::default())
                .expect("process")
                .is_none()
        );
    }

    #[test]
    fn undecodable_page_is_a_decode_error() {
        let p = page(1, 100, 100, Arc::from(b"garbage".to_vec()));
        let det = Detection::normal(
            "3",
            Boxes::Single(NormalizedBox::new(0.0, 0.0, 500.0, 500.0)),
        );
        let q = question(vec![(p, det)]);
        let err = process_logical_question(&q, &CropSettings::default(), None, &OutputOptions::default())
            .expect_err("must fail");
        assert!(matches!(err, CropwerkError::Decode(_)));
    }

    #[test]
    fn original_image_is_kept_on_request() {
        let p = page(1, 100, 100, page_png(100, 100, &[(30, 30, 70, 70)]));
        let det = Detection::normal(
            "3",
            Boxes::Single(NormalizedBox::new(100.0, 100.0, 900.0, 900.0)),
        );
        let q = question(vec![(p, det)]);
        let output = OutputOptions {
            format: OutputFormat::Png,
            keep_original: true,
        };
        let out = process_logical_question(&q, &settings(0, 0, 0), None, &output)
            .expect("process")
            .expect("image");
        let original = decode_image(out.original.as_deref().expect("original")).expect("decode");
        // Untrimmed: the whole 80x80 box.
        assert_eq!(original.dimensions(), (80, 80));
        assert_eq!((out.width, out.height), (40, 40));
    }
}
