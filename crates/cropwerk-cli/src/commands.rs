// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand implementations.

use std::path::{Path, PathBuf};

use clap::Args;
use cropwerk_canvas::encode::encode_image;
use cropwerk_canvas::generate_debug_preview;
use cropwerk_core::config::{OutputFormat, PipelineConfig};
use cropwerk_core::error::{CropwerkError, Result};
use cropwerk_core::types::{NormalizedBox, Page};
use cropwerk_pool::{AbortSignal, BatchEvent, BatchReport, WorkerPool, run_batch};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::manifest::LoadedManifest;
use crate::output::{write_images, write_records};

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Args)]
pub struct ExtractArgs {
    /// Batch manifest listing page images and detections.
    #[arg(long)]
    pub manifest: PathBuf,
    /// Output directory.
    #[arg(long)]
    pub out: PathBuf,
    /// JSON pipeline configuration; flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Questions composited in parallel.
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Padding added to box sides that touch ink, in pixels.
    #[arg(long)]
    pub crop_padding: Option<u32>,
    /// Overlap between stacked continuation parts, in pixels.
    #[arg(long)]
    pub merge_overlap: Option<u32>,
    /// Encode as JPEG with this quality (1-100) instead of PNG.
    #[arg(long, value_name = "QUALITY")]
    pub jpeg: Option<u8>,
    /// Also write the untrimmed stack of every question.
    #[arg(long)]
    pub keep_original: bool,
}

impl ExtractArgs {
    /// File configuration (or defaults) with command-line overrides applied.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(padding) = self.crop_padding {
            config.crop.crop_padding = padding;
        }
        if let Some(overlap) = self.merge_overlap {
            config.crop.merge_overlap = overlap;
        }
        if let Some(quality) = self.jpeg {
            config.output_format = OutputFormat::Jpeg { quality };
        }
        if self.keep_original {
            config.keep_original = true;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn run_extract(args: &ExtractArgs, abort: AbortSignal) -> Result<BatchReport> {
    let config = args.pipeline_config()?;
    let pages = LoadedManifest::load(&args.manifest)?.pages();
    let pool = WorkerPool::new(config.concurrency)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(rx));
    let report = run_batch(&pool, &pages, &config, &abort, Some(&tx)).await;
    drop(tx);
    if let Err(err) = reporter.await {
        warn!(error = %err, "progress reporter stopped early");
    }
    let report = report?;

    write_images(&args.out, &report.images)?;
    write_records(&args.out, &report.images)?;
    for failure in &report.failures {
        warn!(
            file = %failure.question.file_id,
            question = %failure.question.question_id,
            kind = ?failure.kind,
            "{}",
            failure.message
        );
    }
    Ok(report)
}

async fn report_progress(mut rx: mpsc::UnboundedReceiver<BatchEvent>) {
    let mut dispatched = 0usize;
    let mut settled = 0usize;
    while let Some(event) = rx.recv().await {
        match event {
            BatchEvent::Dispatched(_) => dispatched += 1,
            BatchEvent::Completed(_) | BatchEvent::Dropped(_) | BatchEvent::Failed(_) => {
                settled += 1;
                if settled % 10 == 0 || settled == dispatched {
                    info!(settled, dispatched, "progress");
                }
            }
            BatchEvent::Finished { .. } => {}
        }
    }
}

// ---------------------------------------------------------------------------
// preview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Args)]
pub struct PreviewArgs {
    #[arg(long)]
    pub manifest: PathBuf,
    /// File id as listed in the manifest.
    #[arg(long)]
    pub file: String,
    #[arg(long)]
    pub page: u32,
    /// Index of the detection on the page.
    #[arg(long)]
    pub detection: usize,
    /// Index of the box within the detection.
    #[arg(long = "box", default_value_t = 0)]
    pub box_index: usize,
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub out: PathBuf,
}

/// Stage images written by `preview`, in pipeline order.
pub const PREVIEW_STAGES: [&str; 5] = ["raw", "padded", "trimmed", "aligned", "annotated"];

pub fn run_preview(args: &PreviewArgs) -> Result<Vec<PathBuf>> {
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let page = LoadedManifest::load(&args.manifest)?.page(&args.file, args.page)?;
    let b = select_box(&page, args.detection, args.box_index)?;

    let preview = generate_debug_preview(&b, &page, &config.crop)?;
    info!(
        edge_ink = ?preview.edge_ink,
        trim = ?preview.trim,
        "preview generated"
    );

    std::fs::create_dir_all(&args.out)?;
    let stages = [
        &preview.raw,
        &preview.padded,
        &preview.trimmed,
        &preview.aligned,
        &preview.annotated,
    ];
    let mut written = Vec::with_capacity(stages.len());
    for (name, img) in PREVIEW_STAGES.iter().zip(stages) {
        let path = args.out.join(format!("{name}.png"));
        write_png(&path, img)?;
        written.push(path);
    }
    Ok(written)
}

fn select_box(
    page: &Page,
    detection: usize,
    box_index: usize,
) -> Result<NormalizedBox> {
    let det = page.detections.get(detection).ok_or_else(|| {
        CropwerkError::Config(format!(
            "page {} has {} detections, index {detection} requested",
            page.page_number,
            page.detections.len()
        ))
    })?;
    det.boxes.to_vec().get(box_index).copied().ok_or_else(|| {
        CropwerkError::Config(format!(
            "detection {detection} has {} boxes, index {box_index} requested",
            det.boxes.len()
        ))
    })
}

fn write_png(path: &Path, img: &image::RgbaImage) -> Result<()> {
    let bytes = encode_image(img, OutputFormat::Png)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
