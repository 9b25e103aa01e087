//! Encoding decoded surfaces into output containers.

use crate::alpha::{WHITE, flatten_into};
use crate::{ConvertError, DecodedSurface, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Default lossy quality on the 0-1 scale.
pub const DEFAULT_QUALITY: f32 = 0.92;

/// Lowest quality the encoder accepts.
pub const MIN_QUALITY: f32 = 0.01;

/// Supported output containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossy JPEG; quality applies
    #[default]
    Jpeg,
    /// Lossless PNG; quality is ignored
    Png,
}

impl OutputFormat {
    /// File extension written for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    /// MIME type of the output.
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    /// Whether quality has no effect on the output.
    pub fn is_lossless(&self) -> bool {
        matches!(self, OutputFormat::Png)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jpeg => f.write_str("jpeg"),
            OutputFormat::Png => f.write_str("png"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(format!("unsupported output format '{}' (expected jpeg or png)", other)),
        }
    }
}

/// Clamp a quality value into the accepted range.
pub fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() {
        return DEFAULT_QUALITY;
    }
    quality.clamp(MIN_QUALITY, 1.0)
}

fn jpeg_quality(quality: f32) -> u8 {
    ((clamp_quality(quality) * 100.0).round() as u8).clamp(1, 100)
}

/// Anything that can turn a surface into encoded bytes.
///
/// The optimizer probes through this trait so the number of encodes can be
/// observed.
pub trait EncodeSurface {
    /// Encode `surface` as `format` at `quality` (0-1).
    fn encode(&mut self, surface: &DecodedSurface, format: OutputFormat, quality: f32) -> Result<Vec<u8>>;
}

/// Encoder with a reusable scratch buffer.
///
/// JPEG output is flattened onto white into the scratch buffer first, since
/// JPEG has no alpha channel. The buffer grows to the largest image seen and
/// is kept until [`Encoder::release`] is called.
#[derive(Debug, Default)]
pub struct Encoder {
    scratch: Vec<u8>,
}

impl Encoder {
    /// Create an encoder with an empty scratch buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently reserved by the scratch buffer.
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    /// Drop the scratch buffer's memory. Call when a batch completes.
    pub fn release(&mut self) {
        self.scratch = Vec::new();
    }

    fn encode_jpeg(&mut self, surface: &DecodedSurface, quality: f32) -> Result<Vec<u8>> {
        let (width, height) = surface.dimensions();
        flatten_into(surface, WHITE, &mut self.scratch);

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality)).encode(
            &self.scratch,
            width,
            height,
            ColorType::Rgb8,
        )?;
        Ok(out)
    }

    fn encode_png(&mut self, surface: &DecodedSurface) -> Result<Vec<u8>> {
        let (width, height) = surface.dimensions();
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(surface.as_raw(), width, height, ColorType::Rgba8)?;
        Ok(out)
    }
}

impl EncodeSurface for Encoder {
    fn encode(&mut self, surface: &DecodedSurface, format: OutputFormat, quality: f32) -> Result<Vec<u8>> {
        if surface.width() == 0 || surface.height() == 0 {
            return Err(ConvertError::EncodeFailed("image has no pixels".to_string()));
        }

        let data = match format {
            OutputFormat::Jpeg => self.encode_jpeg(surface, quality)?,
            OutputFormat::Png => self.encode_png(surface)?,
        };

        if data.is_empty() {
            return Err(ConvertError::EncodeFailed("encoder produced no data".to_string()));
        }

        trace!(
            format = %format,
            quality,
            width = surface.width(),
            height = surface.height(),
            bytes = data.len(),
            "Encoded surface"
        );
        Ok(data)
    }
}
