// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Encoding — final canvases to PNG/JPEG bytes, data URLs, content digests,
// and the record shape handed to storage.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cropwerk_core::config::OutputFormat;
use cropwerk_core::error::{CropwerkError, Result};
use cropwerk_core::types::{ImageFormat, QuestionImage, QuestionRecord};
use image::buffer::ConvertBuffer;
use image::{RgbImage, RgbaImage};
use sha2::{Digest, Sha256};

/// Encode `img` in the requested output format.
pub fn encode_image(img: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Png => {
            let mut cursor = std::io::Cursor::new(&mut buffer);
            img.write_to(&mut cursor, image::ImageFormat::Png)
                .map_err(|err| CropwerkError::Encode(format!("PNG encoding failed: {err}")))?;
        }
        OutputFormat::Jpeg { quality } => {
            let rgb: RgbImage = img.convert();
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
            rgb.write_with_encoder(encoder)
                .map_err(|err| CropwerkError::Encode(format!("JPEG encoding failed: {err}")))?;
        }
    }
    Ok(buffer)
}

/// Decode an encoded page raster into RGBA pixels.
pub fn decode_image(data: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory(data)
        .map(|img| img.to_rgba8())
        .map_err(|err| CropwerkError::Decode(err.to_string()))
}

/// `data:` URL for encoded image bytes.
pub fn data_url(data: &[u8], format: ImageFormat) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(data))
}

/// SHA-256 of `data` as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Build the persisted record for a finished question image.
pub fn to_record(image: &QuestionImage) -> QuestionRecord {
    QuestionRecord {
        id: image.id.clone(),
        page_number: image.page_number,
        file_name: image.file_id.clone(),
        data_url: data_url(&image.data, image.format),
        original_data_url: image
            .original
            .as_deref()
            .map(|orig| data_url(orig, image.format)),
    }
}
