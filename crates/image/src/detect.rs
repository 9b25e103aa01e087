//! Image format detection from magic bytes, with a filename-extension fallback.

use crate::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Number of header bytes inspected for signatures.
pub const HEADER_LEN: usize = 16;

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG image
    Jpeg,
    /// PNG image
    Png,
    /// WebP image
    WebP,
    /// GIF image
    Gif,
    /// BMP image
    Bmp,
    /// HEIC/HEIF image
    Heic,
    /// AVIF image
    Avif,
    /// TIFF image
    Tiff,
}

/// Decode path required by a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Decoded by the built-in raster engine
    Native,
    /// Needs an on-demand codec from the codec cache
    External,
}

impl Tier {
    /// Numeric tier (1 or 2).
    pub fn number(&self) -> u8 {
        match self {
            Tier::Native => 1,
            Tier::External => 2,
        }
    }
}

/// How a format was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Magic bytes matched
    Signature,
    /// Filename extension matched
    Extension,
}

impl ImageFormat {
    /// Every supported input format, in table order.
    pub const ALL: [ImageFormat; 8] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::WebP,
        ImageFormat::Gif,
        ImageFormat::Bmp,
        ImageFormat::Heic,
        ImageFormat::Avif,
        ImageFormat::Tiff,
    ];

    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Heic => "image/heic",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Tiff => "image/tiff",
        }
    }

    /// Get common file extensions for this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jpeg => &["jpg", "jpeg", "jpe"],
            ImageFormat::Png => &["png"],
            ImageFormat::WebP => &["webp"],
            ImageFormat::Gif => &["gif"],
            ImageFormat::Bmp => &["bmp", "dib"],
            ImageFormat::Heic => &["heic", "heif"],
            ImageFormat::Avif => &["avif"],
            ImageFormat::Tiff => &["tiff", "tif"],
        }
    }

    /// Decode tier for this format.
    pub fn tier(&self) -> Tier {
        match self {
            ImageFormat::Jpeg
            | ImageFormat::Png
            | ImageFormat::WebP
            | ImageFormat::Gif
            | ImageFormat::Bmp => Tier::Native,
            ImageFormat::Heic | ImageFormat::Avif | ImageFormat::Tiff => Tier::External,
        }
    }

    /// Lowercase identifier (`jpeg`, `heic`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Heic => "heic",
            ImageFormat::Avif => "avif",
            ImageFormat::Tiff => "tiff",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectionMethod::Signature => "signature",
            DetectionMethod::Extension => "extension",
        })
    }
}

/// Signature pattern: `None` matches any byte.
type Pattern = &'static [Option<u8>];

const fn b(byte: u8) -> Option<u8> {
    Some(byte)
}

const ANY: Option<u8> = None;

/// Ordered signature table. First full match wins, so ISO-BMFF brands are
/// checked before the short `BM` prefix.
static SIGNATURES: &[(ImageFormat, Pattern)] = &[
    // ....ftypheic / heix / mif1 / MSF1
    (ImageFormat::Heic, &[b(0), b(0), b(0), ANY, b(b'f'), b(b't'), b(b'y'), b(b'p'), b(b'h'), b(b'e'), b(b'i'), b(b'c')]),
    (ImageFormat::Heic, &[b(0), b(0), b(0), ANY, b(b'f'), b(b't'), b(b'y'), b(b'p'), b(b'h'), b(b'e'), b(b'i'), b(b'x')]),
    (ImageFormat::Heic, &[b(0), b(0), b(0), ANY, b(b'f'), b(b't'), b(b'y'), b(b'p'), b(b'm'), b(b'i'), b(b'f'), b(b'1')]),
    (ImageFormat::Heic, &[b(0), b(0), b(0), ANY, b(b'f'), b(b't'), b(b'y'), b(b'p'), b(b'M'), b(b'S'), b(b'F'), b(b'1')]),
    // ....ftypavif
    (ImageFormat::Avif, &[b(0), b(0), b(0), ANY, b(b'f'), b(b't'), b(b'y'), b(b'p'), b(b'a'), b(b'v'), b(b'i'), b(b'f')]),
    // 89 50 4E 47 0D 0A 1A 0A
    (ImageFormat::Png, &[b(0x89), b(0x50), b(0x4E), b(0x47), b(0x0D), b(0x0A), b(0x1A), b(0x0A)]),
    // FF D8 FF
    (ImageFormat::Jpeg, &[b(0xFF), b(0xD8), b(0xFF)]),
    // RIFF....WEBP
    (ImageFormat::WebP, &[b(b'R'), b(b'I'), b(b'F'), b(b'F'), ANY, ANY, ANY, ANY, b(b'W'), b(b'E'), b(b'B'), b(b'P')]),
    // GIF87a / GIF89a
    (ImageFormat::Gif, &[b(b'G'), b(b'I'), b(b'F'), b(b'8'), b(b'7'), b(b'a')]),
    (ImageFormat::Gif, &[b(b'G'), b(b'I'), b(b'F'), b(b'8'), b(b'9'), b(b'a')]),
    // BM
    (ImageFormat::Bmp, &[b(b'B'), b(b'M')]),
    // II*\0 / MM\0*
    (ImageFormat::Tiff, &[b(0x49), b(0x49), b(0x2A), b(0x00)]),
    (ImageFormat::Tiff, &[b(0x4D), b(0x4D), b(0x00), b(0x2A)]),
];

fn matches_signature(bytes: &[u8], pattern: Pattern) -> bool {
    bytes.len() >= pattern.len()
        && pattern
            .iter()
            .zip(bytes)
            .all(|(expected, actual)| expected.map_or(true, |e| e == *actual))
}

/// Detect format from magic bytes.
///
/// Only the first [`HEADER_LEN`] bytes are inspected. Short or empty input
/// yields `None`.
///
/// # Example
/// ```
/// use covert_image::{detect_from_signature, ImageFormat};
///
/// let jpeg = [0xFF, 0xD8, 0xFF, 0xE0];
/// assert_eq!(detect_from_signature(&jpeg), Some(ImageFormat::Jpeg));
///
/// assert_eq!(detect_from_signature(&[]), None);
/// ```
pub fn detect_from_signature(data: &[u8]) -> Option<ImageFormat> {
    let header = &data[..data.len().min(HEADER_LEN)];
    SIGNATURES
        .iter()
        .find(|(_, pattern)| matches_signature(header, pattern))
        .map(|(format, _)| *format)
}

/// Detect format from the text after the last dot of a filename.
pub fn detect_from_extension(filename: &str) -> Option<ImageFormat> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ImageFormat::ALL
        .into_iter()
        .find(|format| format.extensions().contains(&ext.as_str()))
}

/// Raw bytes of one user-supplied file.
#[derive(Debug, Clone)]
pub struct RawInput {
    name: String,
    bytes: Arc<[u8]>,
}

impl RawInput {
    /// Wrap bytes with their filename.
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk. Read failures are reported as `detection_failed`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let bytes = std::fs::read(path).map_err(|e| ConvertError::DetectionFailed {
            file: name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self::new(name, bytes))
    }

    /// Original filename.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of format detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    /// Detected format
    pub format: ImageFormat,
    /// Decode tier
    pub tier: Tier,
    /// Canonical MIME type
    pub mime: &'static str,
    /// Which detection path succeeded
    pub method: DetectionMethod,
}

impl FormatDescriptor {
    fn new(format: ImageFormat, method: DetectionMethod) -> Self {
        Self {
            format,
            tier: format.tier(),
            mime: format.mime_type(),
            method,
        }
    }
}

/// Detect the format of an input. Signatures take precedence; the extension
/// is only consulted when no signature matches.
pub fn detect_format(input: &RawInput) -> Result<FormatDescriptor> {
    if let Some(format) = detect_from_signature(input.bytes()) {
        return Ok(FormatDescriptor::new(format, DetectionMethod::Signature));
    }

    if let Some(format) = detect_from_extension(input.name()) {
        return Ok(FormatDescriptor::new(format, DetectionMethod::Extension));
    }

    Err(ConvertError::UnsupportedFormat {
        file: input.name().to_string(),
        supported: supported_formats().to_vec(),
    })
}

/// An input that passed detection.
#[derive(Debug, Clone)]
pub struct ValidatedInput {
    /// The raw input
    pub input: RawInput,
    /// Its detected format
    pub descriptor: FormatDescriptor,
    /// Index in the batch passed to [`validate_inputs`]
    pub position: usize,
}

/// Inputs split by detection outcome. Each list keeps input order, and every
/// entry carries its index in the original batch.
#[derive(Debug, Default)]
pub struct Validation {
    /// Inputs with a recognized format
    pub valid: Vec<ValidatedInput>,
    /// Detection failures with their batch index
    pub invalid: Vec<(usize, ConvertError)>,
}

/// Run detection over a batch. Detection is independent per file; results
/// keep the order of `inputs`.
pub fn validate_inputs(inputs: Vec<RawInput>) -> Validation {
    let outcomes = detect_all(&inputs);

    let mut validation = Validation::default();
    for (position, (input, outcome)) in inputs.into_iter().zip(outcomes).enumerate() {
        match outcome {
            Ok(descriptor) => validation.valid.push(ValidatedInput {
                input,
                descriptor,
                position,
            }),
            Err(err) => validation.invalid.push((position, err)),
        }
    }
    validation
}

#[cfg(feature = "parallel")]
fn detect_all(inputs: &[RawInput]) -> Vec<Result<FormatDescriptor>> {
    use rayon::prelude::*;
    inputs.par_iter().map(detect_format).collect()
}

#[cfg(not(feature = "parallel"))]
fn detect_all(inputs: &[RawInput]) -> Vec<Result<FormatDescriptor>> {
    inputs.iter().map(detect_format).collect()
}

/// Whether a filename's extension names a supported format.
pub fn is_supported(filename: &str) -> bool {
    detect_from_extension(filename).is_some()
}

/// Every recognized input format.
pub fn supported_formats() -> &'static [ImageFormat] {
    &ImageFormat::ALL
}

/// Static facts about one input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatInfo {
    /// The format
    pub format: ImageFormat,
    /// Decode tier
    pub tier: Tier,
    /// Canonical MIME type
    pub mime: &'static str,
    /// Recognized filename extensions
    pub extensions: &'static [&'static str],
}

/// Look up tier, MIME type and extensions for a format.
pub fn format_info(format: ImageFormat) -> FormatInfo {
    FormatInfo {
        format,
        tier: format.tier(),
        mime: format.mime_type(),
        extensions: format.extensions(),
    }
}

/// Upper-cased, comma separated list of supported formats.
pub fn supported_formats_string() -> String {
    ImageFormat::ALL
        .iter()
        .map(|f| f.name().to_uppercase())
        .collect::<Vec<_>>()
        .join(", ")
}
