//! Image format conversion core for Covert.
//!
//! This crate provides:
//! - Format detection from magic bytes with an extension fallback
//! - Tiered decoding: built-in decoders plus a cached, on-demand codec path
//! - JPEG and PNG encoding with alpha flattening
//! - Size optimization over quality and scale
//! - Sequential batch conversion with per-file results
//! - Size advisories from header-only metadata

#![warn(missing_docs)]

mod alpha;
mod classify;
pub mod codec;
mod convert;
mod detect;
mod encode;
mod error;
mod limits;
mod metadata;
mod optimize;
mod resize;
mod surface;

pub use alpha::{WHITE, flatten_into};
pub use classify::{ImageClass, classify, color_variance};
pub use codec::{CodecCache, CodecLoader, CodecOptions, Codecs, Decode, DefaultCodecLoader, NetworkHint};
pub use convert::{
    BatchProgress, BatchReport, ConversionFailure, ConversionResult, ConvertOptions, ConvertedFile,
    Converter, OptimizationSummary, output_filename,
};
pub use detect::{
    DetectionMethod, FormatDescriptor, FormatInfo, ImageFormat, RawInput, Tier, ValidatedInput,
    Validation, detect_format, detect_from_extension, detect_from_signature, format_info,
    is_supported, supported_formats, supported_formats_string, validate_inputs,
};
pub use encode::{DEFAULT_QUALITY, EncodeSurface, Encoder, OutputFormat, clamp_quality};
pub use error::{ConvertError, ErrorKind, Result, batch_message};
pub use limits::{Limits, format_file_size};
pub use metadata::{ImageMetadata, extract_metadata};
pub use optimize::{
    Lever, OptimizationOutcome, OptimizeRequest, OptimizeSettings, Optimizer, Probe, Strategy,
};
pub use resize::{scale_surface, scaled_dimensions};
pub use surface::DecodedSurface;
