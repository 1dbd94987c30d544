// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Cropwerk question extractor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Side length of the normalized detection coordinate space.
pub const NORMALIZED_SCALE: f64 = 1000.0;

/// Detection id reserved by the detector for continuation fragments.
pub const CONTINUATION_ID: &str = "continuation";

/// A bounding box in the detector's normalized 0–1000 space.
///
/// Serialized as `[ymin, xmin, ymax, xmax]`, the order the detector emits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct NormalizedBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl NormalizedBox {
    pub fn new(ymin: f64, xmin: f64, ymax: f64, xmax: f64) -> Self {
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Whether `self` lies inside `other`, allowing each edge to overshoot
    /// by `tolerance` normalized units.
    pub fn is_inside(&self, other: &NormalizedBox, tolerance: f64) -> bool {
        self.xmin >= other.xmin - tolerance
            && self.ymin >= other.ymin - tolerance
            && self.xmax <= other.xmax + tolerance
            && self.ymax <= other.ymax + tolerance
    }
}

impl From<[f64; 4]> for NormalizedBox {
    fn from([ymin, xmin, ymax, xmax]: [f64; 4]) -> Self {
        Self::new(ymin, xmin, ymax, xmax)
    }
}

impl From<NormalizedBox> for [f64; 4] {
    fn from(b: NormalizedBox) -> Self {
        [b.ymin, b.xmin, b.ymax, b.xmax]
    }
}

/// The detector emits either one box or a list of boxes per detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Boxes {
    Single(NormalizedBox),
    Multi(Vec<NormalizedBox>),
}

impl Boxes {
    /// Normalize to list form.
    pub fn to_vec(&self) -> Vec<NormalizedBox> {
        match self {
            Self::Single(b) => vec![*b],
            Self::Multi(list) => list.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multi(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a detection opens a question or continues the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DetectionKind {
    Normal(String),
    Continuation,
}

impl DetectionKind {
    /// Map a detector id to its kind. Only this function interprets the
    /// reserved continuation id.
    pub fn from_id(id: &str) -> Self {
        if id == CONTINUATION_ID {
            Self::Continuation
        } else {
            Self::Normal(id.to_owned())
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Normal(id) => id,
            Self::Continuation => CONTINUATION_ID,
        }
    }

    pub fn is_continuation(&self) -> bool {
        matches!(self, Self::Continuation)
    }
}

/// One AI-identified question region on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireDetection", into = "WireDetection")]
pub struct Detection {
    pub kind: DetectionKind,
    pub boxes: Boxes,
}

impl Detection {
    pub fn normal(id: impl Into<String>, boxes: Boxes) -> Self {
        Self {
            kind: DetectionKind::Normal(id.into()),
            boxes,
        }
    }

    pub fn continuation(boxes: Boxes) -> Self {
        Self {
            kind: DetectionKind::Continuation,
            boxes,
        }
    }
}

/// Detection as it appears on the wire: `{ "id": ..., "boxes_2d": ... }`.
#[derive(Serialize, Deserialize)]
struct WireDetection {
    id: String,
    boxes_2d: Boxes,
}

impl From<WireDetection> for Detection {
    fn from(wire: WireDetection) -> Self {
        Self {
            kind: DetectionKind::from_id(&wire.id),
            boxes: wire.boxes_2d,
        }
    }
}

impl From<Detection> for WireDetection {
    fn from(det: Detection) -> Self {
        Self {
            id: det.kind.id().to_owned(),
            boxes_2d: det.boxes,
        }
    }
}

/// A rendered page and the detections found on it.
///
/// `image` holds the encoded raster (PNG, JPEG, ...) exactly as the renderer
/// produced it. It is shared read-only; every compositing task decodes its
/// own private copy.
#[derive(Debug, Clone)]
pub struct Page {
    pub file_id: String,
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
    pub image: Arc<[u8]>,
    pub detections: Vec<Detection>,
}

/// One detection of a logical question, together with the page it sits on.
#[derive(Debug, Clone)]
pub struct QuestionPart {
    pub page: Arc<Page>,
    pub detection: Detection,
    pub index_in_page: usize,
}

/// A question reassembled from one or more detections, possibly spanning
/// pages. Parts are ordered by (page number, index in page).
#[derive(Debug, Clone)]
pub struct LogicalQuestion {
    pub id: String,
    pub file_id: String,
    pub parts: Vec<QuestionPart>,
}

impl LogicalQuestion {
    /// Page number of the first part.
    pub fn page_number(&self) -> u32 {
        self.parts.first().map(|p| p.page.page_number).unwrap_or(0)
    }

    /// True when the question opened with a continuation detection.
    pub fn is_orphan(&self) -> bool {
        self.parts
            .first()
            .map(|p| p.detection.kind.is_continuation())
            .unwrap_or(false)
    }
}

/// Encoding of final question images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Final output of the compositing pipeline for one logical question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionImage {
    pub id: String,
    pub file_id: String,
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Encoded final image.
    pub data: Vec<u8>,
    /// Encoded untrimmed image for before/after comparison.
    pub original: Option<Vec<u8>>,
    /// SHA-256 hex digest of `data`.
    pub digest: String,
}

/// Persisted shape consumed by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: String,
    pub page_number: u32,
    pub file_name: String,
    pub data_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_data_url: Option<String>,
}

/// How a failed task should be read by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Bad or undecodable input; skipping the question is reasonable.
    Input,
    /// The execution machinery failed; the input is not to blame.
    Systemic,
    /// The task never ran because the batch was cancelled or cleared.
    Cancelled,
}
