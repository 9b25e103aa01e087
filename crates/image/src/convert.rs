//! Conversion orchestration: decode, optionally optimize, encode.
//!
//! Files are converted strictly one after another so that only one decoded
//! surface is alive at a time. A failing file is recorded and the batch
//! moves on.

use crate::codec::{CodecLoader, Codecs, DefaultCodecLoader};
use crate::encode::{DEFAULT_QUALITY, EncodeSurface, Encoder, OutputFormat, clamp_quality};
use crate::optimize::{OptimizationOutcome, OptimizeRequest, Optimizer, Strategy};
use crate::resize::scaled_dimensions;
use crate::{
    ConvertError, DecodedSurface, ErrorKind, ImageFormat, Result, ValidatedInput, batch_message,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Settings for a conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Target container
    pub output_format: OutputFormat,
    /// Lossy quality, 0-1
    pub quality: f32,
    /// Byte budget per file; 0 disables optimization
    pub target_bytes: u64,
    /// Optimizer may only change dimensions
    pub lock_quality: bool,
    /// Optimizer may only change quality
    pub lock_dimensions: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Jpeg,
            quality: DEFAULT_QUALITY,
            target_bytes: 0,
            lock_quality: false,
            lock_dimensions: false,
        }
    }
}

impl ConvertOptions {
    /// Options for `format` at the default quality.
    pub fn new(output_format: OutputFormat) -> Self {
        Self {
            output_format,
            ..Self::default()
        }
    }

    /// Set quality, clamped to the accepted range.
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = clamp_quality(quality);
        self
    }

    /// Set the byte budget.
    pub fn with_target_bytes(mut self, target_bytes: u64) -> Self {
        self.target_bytes = target_bytes;
        self
    }

    /// Whether files go through the optimizer.
    pub fn optimizes(&self) -> bool {
        self.target_bytes > 0
    }
}

/// Optimizer bookkeeping kept with a converted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    /// Quality used
    pub quality: f32,
    /// Scale used
    pub scale: f32,
    /// Encodes after the first
    pub iterations: u32,
    /// Whether the budget was met
    pub target_met: bool,
    /// Lever order
    pub strategy: Strategy,
}

impl From<&OptimizationOutcome> for OptimizationSummary {
    fn from(outcome: &OptimizationOutcome) -> Self {
        Self {
            quality: outcome.quality,
            scale: outcome.scale,
            iterations: outcome.iterations,
            target_met: outcome.target_met,
            strategy: outcome.strategy,
        }
    }
}

/// A successfully converted file.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertedFile {
    /// Encoded output
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Output filename
    pub file_name: String,
    /// Input filename
    pub original_name: String,
    /// Detected input format
    pub input_format: ImageFormat,
    /// Output container
    pub output_format: OutputFormat,
    /// Size of `data`
    pub byte_size: u64,
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// Present when the file went through the optimizer
    pub optimization: Option<OptimizationSummary>,
}

/// A file that could not be converted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionFailure {
    /// Failure class
    pub kind: ErrorKind,
    /// Description of what went wrong
    pub message: String,
    /// Input filename
    pub file_name: String,
    /// Detected input format, if detection got that far
    pub input_format: Option<ImageFormat>,
}

impl ConversionFailure {
    /// Build from an error and the file it belongs to.
    pub fn new(file_name: impl Into<String>, err: &ConvertError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            file_name: file_name.into(),
            input_format: err.input_format(),
        }
    }

    /// Short user-facing message for the kind.
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    /// Guidance for the kind.
    pub fn guidance(&self) -> &'static str {
        self.kind.guidance()
    }
}

/// Outcome for one file.
pub type ConversionResult = std::result::Result<ConvertedFile, ConversionFailure>;

/// Progress notification. `result` is `None` before the file is processed
/// and set after.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress<'a> {
    /// 1-based index of the current file
    pub current: usize,
    /// Files in the batch
    pub total: usize,
    /// Result of the current file, once known
    pub result: Option<&'a ConversionResult>,
}

/// All results of a batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    results: Vec<ConversionResult>,
}

impl BatchReport {
    /// Every result, in input order.
    pub fn results(&self) -> &[ConversionResult] {
        &self.results
    }

    /// Converted files.
    pub fn successes(&self) -> impl Iterator<Item = &ConvertedFile> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    /// Failed files.
    pub fn failures(&self) -> impl Iterator<Item = &ConversionFailure> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }

    /// Files in the batch.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Number of converted files.
    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    /// Number of failed files.
    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// At least one file converted.
    pub fn is_success(&self) -> bool {
        self.success_count() > 0
    }

    /// Some but not all files converted.
    pub fn is_partial(&self) -> bool {
        self.is_success() && self.failure_count() > 0
    }

    /// Optimized files that met their budget.
    pub fn target_met_count(&self) -> usize {
        self.successes()
            .filter(|f| f.optimization.as_ref().is_some_and(|o| o.target_met))
            .count()
    }

    /// Optimized files returned as best-effort.
    pub fn best_effort_count(&self) -> usize {
        self.successes()
            .filter(|f| f.optimization.as_ref().is_some_and(|o| !o.target_met))
            .count()
    }

    /// One-line summary for the user.
    pub fn summary_message(&self) -> String {
        batch_message(self.success_count(), self.total())
    }

    /// Take ownership of the converted files.
    pub fn into_successes(self) -> Vec<ConvertedFile> {
        self.results.into_iter().filter_map(|r| r.ok()).collect()
    }
}

/// Replace the extension of `original` with the one for `format`.
///
/// Only a final `.ext` with at least one character and no path separator is
/// removed.
///
/// ```
/// use covert_image::{output_filename, OutputFormat};
///
/// assert_eq!(output_filename("IMG_0001.HEIC", OutputFormat::Jpeg), "IMG_0001.jpg");
/// assert_eq!(output_filename("scan.v2.tiff", OutputFormat::Png), "scan.v2.png");
/// assert_eq!(output_filename("noext", OutputFormat::Png), "noext.png");
/// ```
pub fn output_filename(original: &str, format: OutputFormat) -> String {
    let stem = match original.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && !ext.contains('/') => stem,
        _ => original,
    };
    format!("{}.{}", stem, format.extension())
}

struct Encoded {
    data: Vec<u8>,
    width: u32,
    height: u32,
    optimization: Option<OptimizationSummary>,
}

fn encode_surface<E: EncodeSurface>(
    encoder: &mut E,
    optimizer: &Optimizer,
    surface: &DecodedSurface,
    options: &ConvertOptions,
) -> Result<Encoded> {
    let (width, height) = surface.dimensions();

    if !options.optimizes() {
        let data = encoder.encode(surface, options.output_format, options.quality)?;
        return Ok(Encoded {
            data,
            width,
            height,
            optimization: None,
        });
    }

    let request = OptimizeRequest {
        target_bytes: options.target_bytes,
        format: options.output_format,
        initial_quality: options.quality,
        lock_quality: options.lock_quality,
        lock_dimensions: options.lock_dimensions,
    };
    let outcome = optimizer.optimize(encoder, surface, &request)?;
    let (width, height) = scaled_dimensions(width, height, outcome.scale);
    let optimization = Some(OptimizationSummary::from(&outcome));

    Ok(Encoded {
        data: outcome.data,
        width,
        height,
        optimization,
    })
}

/// Drives detect → decode → encode for single files and batches.
pub struct Converter<L: CodecLoader = DefaultCodecLoader> {
    codecs: Codecs<L>,
    optimizer: Optimizer,
    encoder: Encoder,
}

impl<L: CodecLoader> Converter<L> {
    /// Create a converter.
    pub fn new(codecs: Codecs<L>, optimizer: Optimizer) -> Self {
        Self {
            codecs,
            optimizer,
            encoder: Encoder::new(),
        }
    }

    /// The codec provider.
    pub fn codecs(&self) -> &Codecs<L> {
        &self.codecs
    }

    /// Release the encoder's scratch memory. Call after a batch.
    pub fn reset(&mut self) {
        self.encoder.release();
    }

    /// Bytes held by the encoder's scratch buffer.
    pub fn scratch_capacity(&self) -> usize {
        self.encoder.scratch_capacity()
    }

    async fn try_convert(&mut self, item: &ValidatedInput, options: &ConvertOptions) -> Result<ConvertedFile> {
        let input = &item.input;
        let descriptor = &item.descriptor;
        let surface = self.codecs.decode(input, descriptor).await?;

        let mut encoder = std::mem::take(&mut self.encoder);
        let optimizer = self.optimizer.clone();
        let task_options = options.clone();
        let (encoder, encoded) = tokio::task::spawn_blocking(move || {
            let encoded = encode_surface(&mut encoder, &optimizer, &surface, &task_options);
            (encoder, encoded)
        })
        .await
        .map_err(|e| ConvertError::Unknown(format!("encode task failed: {}", e)))?;
        self.encoder = encoder;
        let encoded = encoded?;

        Ok(ConvertedFile {
            byte_size: encoded.data.len() as u64,
            data: encoded.data,
            file_name: output_filename(input.name(), options.output_format),
            original_name: input.name().to_string(),
            input_format: descriptor.format,
            output_format: options.output_format,
            width: encoded.width,
            height: encoded.height,
            optimization: encoded.optimization,
        })
    }

    /// Convert one validated input. Never fails the caller; errors become a
    /// [`ConversionFailure`].
    pub async fn convert_file(&mut self, item: &ValidatedInput, options: &ConvertOptions) -> ConversionResult {
        let started = Instant::now();
        let name = item.input.name();

        match self.try_convert(item, options).await {
            Ok(file) => {
                info!(
                    file = name,
                    format = %item.descriptor.format,
                    output = %file.file_name,
                    bytes = file.byte_size,
                    width = file.width,
                    height = file.height,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Converted"
                );
                Ok(file)
            }
            Err(err) => {
                warn!(file = name, kind = %err.kind(), error = %err, "Conversion failed");
                let mut failure = ConversionFailure::new(name, &err);
                failure.input_format.get_or_insert(item.descriptor.format);
                Err(failure)
            }
        }
    }

    /// Convert a batch in order.
    ///
    /// `on_progress` is called twice per file: before conversion with no
    /// result and after with the result. An empty batch is an error.
    pub async fn convert_all<F>(
        &mut self,
        inputs: &[ValidatedInput],
        options: &ConvertOptions,
        mut on_progress: F,
    ) -> Result<BatchReport>
    where
        F: FnMut(BatchProgress<'_>),
    {
        if inputs.is_empty() {
            return Err(ConvertError::Unknown("No files to convert".to_string()));
        }

        let total = inputs.len();
        let mut report = BatchReport {
            results: Vec::with_capacity(total),
        };
        debug!(total, format = %options.output_format, target_bytes = options.target_bytes, "Starting batch");

        for (i, item) in inputs.iter().enumerate() {
            on_progress(BatchProgress {
                current: i + 1,
                total,
                result: None,
            });

            let result = self.convert_file(item, options).await;
            report.results.push(result);

            on_progress(BatchProgress {
                current: i + 1,
                total,
                result: report.results.last(),
            });
        }

        info!(
            total,
            converted = report.success_count(),
            failed = report.failure_count(),
            "Batch finished"
        );
        Ok(report)
    }
}
