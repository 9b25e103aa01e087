//! Error types for the conversion pipeline.
//!
//! Every failure carries an [`ErrorKind`], which maps to a fixed user-facing
//! message and a longer guidance string. The wording lives in static tables
//! so the same kind always reads the same way.

use crate::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Classification of a conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Neither signature nor extension matched a known format
    UnsupportedFormat,
    /// The input header could not be read
    DetectionFailed,
    /// Recognized bytes could not be turned into pixels
    DecodeFailed,
    /// Pixels could not be serialized to the target container
    EncodeFailed,
    /// An external decoding module failed to load
    CodecLoadFailed,
    /// Advisory: decoded image would not fit the memory budget
    MemoryExceeded,
    /// Advisory: input file is very large
    FileTooLarge,
    /// Anything not classified above
    Unknown,
}

impl ErrorKind {
    /// Stable identifier, as used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::DetectionFailed => "detection_failed",
            ErrorKind::DecodeFailed => "decode_failed",
            ErrorKind::EncodeFailed => "encode_failed",
            ErrorKind::CodecLoadFailed => "codec_load_failed",
            ErrorKind::MemoryExceeded => "memory_exceeded",
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Short user-facing message.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "This file type isn't supported.",
            ErrorKind::DetectionFailed => "Couldn't read this file.",
            ErrorKind::DecodeFailed => "Couldn't convert this file.",
            ErrorKind::EncodeFailed => "Couldn't save the converted file.",
            ErrorKind::CodecLoadFailed => "This file type needs a decoder that isn't available.",
            ErrorKind::MemoryExceeded => "This file is too large to convert here.",
            ErrorKind::FileTooLarge => "This file is very large and may take a while.",
            ErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }

    /// Longer guidance shown next to the message.
    pub fn guidance(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => {
                "Supported formats are HEIC, WebP, AVIF, TIFF, PNG, JPEG, BMP, and GIF."
            }
            ErrorKind::DetectionFailed => "The file may be corrupted or incomplete.",
            ErrorKind::DecodeFailed => "The file may be corrupted or in an unsupported variant.",
            ErrorKind::EncodeFailed => "Try converting again, or pick the other output format.",
            ErrorKind::CodecLoadFailed => {
                "Check your connection and try again, or install the decoder for this format."
            }
            ErrorKind::MemoryExceeded => "Try a smaller file or close other applications.",
            ErrorKind::FileTooLarge => "Consider compressing the file first.",
            ErrorKind::Unknown => "If this keeps happening, please report it.",
        }
    }

    /// Message followed by guidance.
    pub fn full_message(&self) -> String {
        format!("{} {}", self.user_message(), self.guidance())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the conversion pipeline.
///
/// All variants own plain data so the error can be cloned and shared between
/// callers awaiting the same codec load.
#[derive(Debug, Clone, Error)]
pub enum ConvertError {
    /// No signature or extension matched
    #[error("{file}: unsupported format")]
    UnsupportedFormat {
        /// Originating file name
        file: String,
        /// Every format the detector recognizes
        supported: Vec<ImageFormat>,
    },

    /// Input could not be read
    #[error("{file}: could not read file: {reason}")]
    DetectionFailed {
        /// Originating file name
        file: String,
        /// Underlying cause
        reason: String,
    },

    /// Pixel decoding failed
    #[error("{file}: failed to decode {format:?}: {reason}")]
    DecodeFailed {
        /// Originating file name
        file: String,
        /// Detected input format
        format: ImageFormat,
        /// Underlying cause
        reason: String,
    },

    /// Encoding to the target container failed
    #[error("failed to encode image: {0}")]
    EncodeFailed(String),

    /// External decoding capability could not be loaded
    #[error("failed to load {format:?} codec: {reason}")]
    CodecLoadFailed {
        /// Format whose codec failed to load
        format: ImageFormat,
        /// Underlying cause
        reason: String,
    },

    /// No codec is registered for the format
    #[error("no codec registered for {0:?}")]
    NoCodec(ImageFormat),

    /// Decoded image would exceed the memory budget
    #[error("{file}: needs about {required} bytes of pixel memory (budget {budget})")]
    MemoryExceeded {
        /// Originating file name
        file: String,
        /// Estimated decoded size
        required: u64,
        /// Configured budget
        budget: u64,
    },

    /// Input file exceeds the size warning threshold
    #[error("{file}: {size} bytes exceeds {limit} bytes")]
    FileTooLarge {
        /// Originating file name
        file: String,
        /// File size in bytes
        size: u64,
        /// Warning threshold
        limit: u64,
    },

    /// Catch-all
    #[error("{0}")]
    Unknown(String),
}

impl ConvertError {
    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UnsupportedFormat { .. } | ConvertError::NoCodec(_) => {
                ErrorKind::UnsupportedFormat
            }
            ConvertError::DetectionFailed { .. } => ErrorKind::DetectionFailed,
            ConvertError::DecodeFailed { .. } => ErrorKind::DecodeFailed,
            ConvertError::EncodeFailed(_) => ErrorKind::EncodeFailed,
            ConvertError::CodecLoadFailed { .. } => ErrorKind::CodecLoadFailed,
            ConvertError::MemoryExceeded { .. } => ErrorKind::MemoryExceeded,
            ConvertError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            ConvertError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// File the error belongs to, if it names one.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            ConvertError::UnsupportedFormat { file, .. }
            | ConvertError::DetectionFailed { file, .. }
            | ConvertError::DecodeFailed { file, .. }
            | ConvertError::MemoryExceeded { file, .. }
            | ConvertError::FileTooLarge { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Input format attached to the error, if any.
    pub fn input_format(&self) -> Option<ImageFormat> {
        match self {
            ConvertError::DecodeFailed { format, .. }
            | ConvertError::CodecLoadFailed { format, .. }
            | ConvertError::NoCodec(format) => Some(*format),
            _ => None,
        }
    }

    pub(crate) fn decode(file: &str, format: ImageFormat, reason: impl fmt::Display) -> Self {
        ConvertError::DecodeFailed {
            file: file.to_string(),
            format,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn codec_load(format: ImageFormat, reason: impl fmt::Display) -> Self {
        ConvertError::CodecLoadFailed {
            format,
            reason: reason.to_string(),
        }
    }
}

impl From<image::ImageError> for ConvertError {
    fn from(err: image::ImageError) -> Self {
        ConvertError::EncodeFailed(err.to_string())
    }
}

/// Summary line for a finished batch.
///
/// ```
/// use covert_image::batch_message;
///
/// assert_eq!(batch_message(3, 3), "All 3 files converted!");
/// assert_eq!(batch_message(2, 3), "Converted 2 of 3 files.");
/// ```
pub fn batch_message(success: usize, total: usize) -> String {
    if success == total {
        return if total == 1 {
            "File converted!".to_string()
        } else {
            format!("All {} files converted!", total)
        };
    }
    if success == 0 {
        return if total == 1 {
            "Couldn't convert this file.".to_string()
        } else {
            "Couldn't convert any files.".to_string()
        };
    }
    format!("Converted {} of {} files.", success, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = ConvertError::decode("a.png", ImageFormat::Png, "truncated");
        assert_eq!(err.kind(), ErrorKind::DecodeFailed);
        assert_eq!(err.input_format(), Some(ImageFormat::Png));
        assert_eq!(err.file_name(), Some("a.png"));

        let err = ConvertError::NoCodec(ImageFormat::Jpeg);
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(err.file_name(), None);

        let err = ConvertError::codec_load(ImageFormat::Heic, "timed out");
        assert_eq!(err.kind(), ErrorKind::CodecLoadFailed);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::CodecLoadFailed).unwrap();
        assert_eq!(json, "\"codec_load_failed\"");
        assert_eq!(ErrorKind::CodecLoadFailed.to_string(), "codec_load_failed");
    }

    #[test]
    fn test_every_kind_has_wording() {
        let kinds = [
            ErrorKind::UnsupportedFormat,
            ErrorKind::DetectionFailed,
            ErrorKind::DecodeFailed,
            ErrorKind::EncodeFailed,
            ErrorKind::CodecLoadFailed,
            ErrorKind::MemoryExceeded,
            ErrorKind::FileTooLarge,
            ErrorKind::Unknown,
        ];
        for kind in kinds {
            assert!(!kind.user_message().is_empty());
            assert!(!kind.guidance().is_empty());
            assert!(kind.full_message().starts_with(kind.user_message()));
        }
    }

    #[test]
    fn test_batch_message() {
        assert_eq!(batch_message(1, 1), "File converted!");
        assert_eq!(batch_message(4, 4), "All 4 files converted!");
        assert_eq!(batch_message(0, 1), "Couldn't convert this file.");
        assert_eq!(batch_message(0, 5), "Couldn't convert any files.");
        assert_eq!(batch_message(3, 4), "Converted 3 of 4 files.");
    }
}
