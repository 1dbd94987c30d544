// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch manifest — rendered page images plus the detector output for each.
//
// {
//   "files": [
//     { "file_id": "exam.pdf",
//       "pages": [ { "page_number": 1, "image": "exam/p1.png",
//                    "detections": [ { "id": "1", "boxes_2d": [10, 50, 300, 950] } ] } ] }
//   ]
// }
//
// Relative image paths resolve against the manifest's directory. Page
// dimensions come from the image header, not from the manifest.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cropwerk_core::error::{CropwerkError, Result};
use cropwerk_core::types::{Detection, Page};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    pub file_id: String,
    pub pages: Vec<ManifestPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPage {
    pub page_number: u32,
    pub image: PathBuf,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// A parsed manifest together with the directory its paths are relative to.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    pub base_dir: PathBuf,
}

impl LoadedManifest {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&raw)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        info!(files = manifest.files.len(), "manifest loaded");
        Ok(Self { manifest, base_dir })
    }

    /// Read every page image and build the pipeline's page list.
    ///
    /// A page whose image is missing or unreadable stays in the list with
    /// zero dimensions, so grouping is unchanged and only its own questions
    /// fail when they are composited.
    pub fn pages(&self) -> Vec<Arc<Page>> {
        let mut pages = Vec::new();
        for file in &self.manifest.files {
            for entry in &file.pages {
                let page = self.load_page(&file.file_id, entry).unwrap_or_else(|err| {
                    warn!(
                        file = %file.file_id,
                        page = entry.page_number,
                        error = %err,
                        "page image unreadable; its questions will fail"
                    );
                    self.unreadable_page(&file.file_id, entry)
                });
                pages.push(Arc::new(page));
            }
        }
        pages
    }

    /// Load one page by file id and page number.
    pub fn page(&self, file_id: &str, page_number: u32) -> Result<Page> {
        let file = self
            .manifest
            .files
            .iter()
            .find(|f| f.file_id == file_id)
            .ok_or_else(|| CropwerkError::Config(format!("file {file_id:?} not in manifest")))?;
        let entry = file
            .pages
            .iter()
            .find(|p| p.page_number == page_number)
            .ok_or_else(|| {
                CropwerkError::Config(format!("page {page_number} of {file_id:?} not in manifest"))
            })?;
        self.load_page(file_id, entry)
    }

    fn load_page(&self, file_id: &str, entry: &ManifestPage) -> Result<Page> {
        let path = self.base_dir.join(&entry.image);
        let bytes = std::fs::read(&path)?;
        let (width, height) = image_dimensions(&bytes)
            .map_err(|err| CropwerkError::Decode(format!("{}: {err}", path.display())))?;
        debug!(
            file = file_id,
            page = entry.page_number,
            width,
            height,
            detections = entry.detections.len(),
            "page loaded"
        );
        Ok(Page {
            file_id: file_id.to_owned(),
            page_number: entry.page_number,
            width,
            height,
            image: Arc::from(bytes),
            detections: entry.detections.clone(),
        })
    }

    /// Placeholder for a page that could not be loaded; whatever bytes exist
    /// are kept for the decoder to reject.
    fn unreadable_page(&self, file_id: &str, entry: &ManifestPage) -> Page {
        let bytes = std::fs::read(self.base_dir.join(&entry.image)).unwrap_or_default();
        Page {
            file_id: file_id.to_owned(),
            page_number: entry.page_number,
            width: 0,
            height: 0,
            image: Arc::from(bytes),
            detections: entry.detections.clone(),
        }
    }
}

/// Read width and height from an encoded image header.
fn image_dimensions(bytes: &[u8]) -> std::result::Result<(u32, u32), image::ImageError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}
