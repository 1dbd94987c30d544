// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{CropwerkError, Result};
use crate::types::ImageFormat;

/// Padding added around the content of a final question canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasPadding {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl CanvasPadding {
    pub fn uniform(px: u32) -> Self {
        Self {
            top: px,
            right: px,
            bottom: px,
            left: px,
        }
    }

    pub fn horizontal(&self) -> u32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> u32 {
        self.top + self.bottom
    }
}

impl Default for CanvasPadding {
    fn default() -> Self {
        Self::uniform(10)
    }
}

/// Pixel settings for one compositing run. Immutable while the run lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropSettings {
    /// Padding added on box sides whose border band contains ink.
    pub crop_padding: u32,
    /// Padding around the final aligned canvas.
    pub canvas_padding: CanvasPadding,
    /// Vertical overlap between consecutive continuation parts.
    pub merge_overlap: u32,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            crop_padding: 20,
            canvas_padding: CanvasPadding::default(),
            merge_overlap: 0,
        }
    }
}

/// Encoding applied to final question images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg { quality: u8 },
}

impl OutputFormat {
    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg { .. } => ImageFormat::Jpeg,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

/// Settings for a whole extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub crop: CropSettings,
    /// Number of questions composited in parallel.
    pub concurrency: usize,
    pub output_format: OutputFormat,
    /// Also encode the untrimmed image of every question.
    pub keep_original: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crop: CropSettings::default(),
            concurrency: 4,
            output_format: OutputFormat::Png,
            keep_original: false,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        debug!(?config, "pipeline configuration loaded");
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CropwerkError::Config("concurrency must be at least 1".into()));
        }
        if let OutputFormat::Jpeg { quality } = self.output_format {
            if !(1..=100).contains(&quality) {
                return Err(CropwerkError::Config(format!(
                    "JPEG quality must be within 1..=100, got {quality}"
                )));
            }
        }
        Ok(())
    }
}
