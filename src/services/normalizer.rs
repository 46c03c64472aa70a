use base64::{engine::general_purpose, Engine};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::models::MimeType;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Failed to load image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to read image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode compressed image: {0}")]
    Encode(String),
    #[error("Invalid compression options: {0}")]
    InvalidOptions(String),
}

/// Where a captured image comes from.
pub enum ImageSource<'a> {
    /// Raw pixels of a live camera frame
    Frame(&'a RgbaImage),
    /// An encoded image already in memory (jpeg/png/webp)
    Encoded(&'a [u8]),
    /// An image file on disk
    File(&'a Path),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality factor in (0, 1]
    pub quality: f32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1200,
            quality: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub base64: String,
    pub mime_type: MimeType,
    pub width: u32,
    pub height: u32,
    /// Encoded size for files and blobs, raw RGBA size for frames
    pub original_size: usize,
    pub compressed_size: usize,
}

/// Scale down (never up) to fit the bounds and re-encode as JPEG.
pub fn compress_image(
    source: ImageSource<'_>,
    options: &CompressOptions,
) -> Result<CompressedImage, NormalizeError> {
    if !(options.quality > 0.0 && options.quality <= 1.0) {
        return Err(NormalizeError::InvalidOptions(format!(
            "quality must be in (0, 1], got {}",
            options.quality
        )));
    }
    if options.max_width == 0 || options.max_height == 0 {
        return Err(NormalizeError::InvalidOptions(
            "max dimensions must be positive".to_string(),
        ));
    }

    let (image, original_size) = match source {
        ImageSource::Frame(frame) => {
            let size = frame.as_raw().len();
            (DynamicImage::ImageRgba8(frame.clone()), size)
        }
        ImageSource::Encoded(bytes) => (image::load_from_memory(bytes)?, bytes.len()),
        ImageSource::File(path) => {
            let bytes = read_file(path)?;
            (image::load_from_memory(&bytes)?, bytes.len())
        }
    };

    let (src_width, src_height) = image.dimensions();
    let (width, height) =
        scaled_dimensions(src_width, src_height, options.max_width, options.max_height);

    let resized = if (width, height) == (src_width, src_height) {
        image
    } else {
        log::debug!(
            "🖼️ Scaling {}x{} -> {}x{}",
            src_width,
            src_height,
            width,
            height
        );
        image.resize_exact(width, height, FilterType::Triangle)
    };

    let jpeg = encode_jpeg(&resized, options.quality)?;
    log::debug!(
        "📦 Compressed image: {} -> {} bytes",
        original_size,
        jpeg.len()
    );

    Ok(CompressedImage {
        base64: general_purpose::STANDARD.encode(&jpeg),
        mime_type: MimeType::Jpeg,
        width,
        height,
        original_size,
        compressed_size: jpeg.len(),
    })
}

// The handle is closed when this returns, whether or not reading succeeded.
fn read_file(path: &Path) -> Result<Vec<u8>, NormalizeError> {
    let io_err = |source| NormalizeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(io_err)?;
    Ok(bytes)
}

fn encode_jpeg(image: &DynamicImage, quality: f32) -> Result<Vec<u8>, NormalizeError> {
    // JPEG has no alpha channel
    let rgb = image.to_rgb8();
    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|e| NormalizeError::Encode(e.to_string()))?;

    if buffer.is_empty() {
        return Err(NormalizeError::Encode("encoder produced no data".to_string()));
    }
    Ok(buffer)
}

/// Fit `src` inside `max` keeping the aspect ratio; never upscales.
pub fn scaled_dimensions(src_width: u32, src_height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let mut width = src_width as f64;
    let mut height = src_height as f64;

    if width > max_width as f64 {
        height = height * max_width as f64 / width;
        width = max_width as f64;
    }
    if height > max_height as f64 {
        width = width * max_height as f64 / height;
        height = max_height as f64;
    }

    let width = (width.round() as u32).clamp(1, max_width.max(1));
    let height = (height.round() as u32).clamp(1, max_height.max(1));
    (width, height)
}

/// Human-readable byte size: `512 B`, `12.3 KB`, `4.0 MB`.
pub fn format_file_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
