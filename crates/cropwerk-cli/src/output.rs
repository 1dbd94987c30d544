// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Writing finished question images and their records to disk.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use cropwerk_canvas::encode::to_record;
use cropwerk_core::error::Result;
use cropwerk_core::types::{QuestionImage, QuestionRecord};
use tracing::{debug, info};

/// Name of the record list written next to the images.
pub const RECORDS_FILE: &str = "questions.json";

/// Write each image to `<out>/<file_id>/<id>.<ext>` (and the untrimmed
/// original to `<id>.original.<ext>` when present). Returns the written
/// image paths in input order.
pub fn write_images(out_dir: &Path, images: &[QuestionImage]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(images.len());
    for image in images {
        let dir = out_dir.join(path_safe(&image.file_id));
        std::fs::create_dir_all(&dir)?;
        let ext = image.format.extension();
        let path = dir.join(format!("{}.{ext}", path_safe(&image.id)));
        std::fs::write(&path, &image.data)?;
        if let Some(original) = &image.original {
            std::fs::write(dir.join(format!("{}.original.{ext}", path_safe(&image.id))), original)?;
        }
        debug!(path = %path.display(), bytes = image.data.len(), "question image written");
        written.push(path);
    }
    Ok(written)
}

/// Write the storage records of all images to `<out>/questions.json`.
pub fn write_records(out_dir: &Path, images: &[QuestionImage]) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let records: Vec<QuestionRecord> = images.iter().map(to_record).collect();
    let path = out_dir.join(RECORDS_FILE);
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, &records)?;
    info!(path = %path.display(), records = records.len(), "records written");
    Ok(path)
}

/// Replace characters that would escape or split a path component.
fn path_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}
