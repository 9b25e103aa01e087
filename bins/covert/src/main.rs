//! covert: convert HEIC, WebP, AVIF and other images to JPEG or PNG.

use clap::{Args, Parser, Subcommand};
use covert_cli::output::{Status, format_count, format_duration, parse_size};
use covert_cli::progress::{DeferredProgress, SHOW_AFTER};
use covert_core::config::Config;
use covert_core::error::exit_codes;
use covert_core::inputs::InputScanner;
use covert_core::{Error, Result};
use covert_image::{
    BatchReport, CodecCache, Codecs, ConversionFailure, ConvertError, ConvertedFile, Converter,
    DefaultCodecLoader, ImageFormat, Limits, Optimizer, OutputFormat, RawInput, ValidatedInput,
    Validation, batch_message, detect_format, format_file_size, format_info, supported_formats,
    validate_inputs,
};
use covert_telemetry::{TelemetryConfig, Timer};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "covert")]
#[command(about = "Convert HEIC, WebP, AVIF and other images to JPEG or PNG")]
#[command(version)]
struct Cli {
    /// Configuration file (default: .covert.toml, covert.toml, .config/covert.toml)
    #[arg(long, global = true, env = "COVERT_CONFIG")]
    config: Option<String>,

    /// Machine-readable output on stdout, JSON logs on stderr
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also walk hidden files and directories
    #[arg(long, global = true)]
    hidden: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the format of image files
    Detect {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Convert images to JPEG or PNG
    Convert(ConvertArgs),
    /// List supported input formats
    Formats,
}

#[derive(Args)]
struct ConvertArgs {
    /// Files or directories to convert
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Output format: jpeg or png
    #[arg(long = "to", value_parser = OutputFormat::from_str)]
    to: Option<OutputFormat>,

    /// JPEG quality, 1-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Per-file size budget, e.g. 200KB or 1.5MB
    #[arg(long, value_parser = parse_size)]
    target_size: Option<u64>,

    /// Reach the size budget by resizing only
    #[arg(long)]
    lock_quality: bool,

    /// Reach the size budget by lowering quality only
    #[arg(long)]
    lock_dimensions: bool,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => exit_with(&err, cli.json),
    };

    covert_telemetry::init_with_config(TelemetryConfig {
        log_level: config.schema.logging.level.clone(),
        verbose: cli.verbose,
        json: cli.json || config.schema.logging.json,
        ..TelemetryConfig::default()
    })?;

    let result = match cli.command {
        Commands::Detect { paths } => run_detect(paths, cli.hidden, cli.json),
        Commands::Convert(args) => run_convert(args, config, cli.hidden, cli.json).await,
        Commands::Formats => run_formats(cli.json),
    };

    match result {
        Ok(exit_codes::SUCCESS) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(err) => exit_with(&err, cli.json),
    }
}

fn exit_with(err: &Error, json: bool) -> ! {
    if json {
        match serde_json::to_string_pretty(&err.to_report()) {
            Ok(report) => println!("{}", report),
            Err(_) => eprintln!("{}", err),
        }
    } else {
        Status::error(&err.to_string());
    }
    std::process::exit(err.exit_code())
}

/// Files to process. Walked entries without an image extension are skipped;
/// files named on the command line are always kept and checked by content.
fn scan_inputs(paths: Vec<PathBuf>, hidden: bool) -> Result<Vec<PathBuf>> {
    let files = InputScanner::new(paths)
        .supported_only(true)
        .include_hidden(hidden)
        .scan()?;
    if files.is_empty() {
        return Err(Error::no_inputs());
    }
    Ok(files)
}

fn run_detect(paths: Vec<PathBuf>, hidden: bool, json: bool) -> Result<i32> {
    let files = scan_inputs(paths, hidden)?;

    let mut rows = Vec::with_capacity(files.len());
    let mut unrecognized = 0;

    for path in &files {
        let shown = path.display().to_string();
        match RawInput::from_path(path).and_then(|input| detect_format(&input)) {
            Ok(descriptor) if json => rows.push(json!({ "path": shown, "format": descriptor })),
            Ok(descriptor) => println!(
                "{}  {}  tier {}  {}  ({})",
                shown,
                descriptor.format.name().to_uppercase(),
                descriptor.tier.number(),
                descriptor.mime,
                descriptor.method
            ),
            Err(err) => {
                unrecognized += 1;
                if json {
                    rows.push(json!({
                        "path": shown,
                        "error": { "kind": err.kind(), "message": err.to_string() },
                    }));
                } else {
                    Status::failure(&shown, err.kind().user_message(), err.kind().guidance());
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }

    Ok(if unrecognized == files.len() {
        exit_codes::FAILURE
    } else {
        exit_codes::SUCCESS
    })
}

fn run_formats(json: bool) -> Result<i32> {
    let infos: Vec<_> = supported_formats().iter().copied().map(format_info).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(exit_codes::SUCCESS);
    }

    Status::header("Supported input formats");
    for info in &infos {
        println!(
            "  {:<5} tier {}  {:<11} .{}",
            info.format.name().to_uppercase(),
            info.tier.number(),
            info.mime,
            info.extensions.join(" .")
        );
    }
    println!();
    println!("Output formats: JPEG, PNG");
    Ok(exit_codes::SUCCESS)
}

/// Inputs read from disk and run through detection. Failures are keyed by
/// their index in the scanned file list.
struct Batch {
    validation: Validation,
    file_index: Vec<usize>,
    failures: Vec<(usize, ConversionFailure)>,
}

impl Batch {
    fn load(files: &[PathBuf], limits: &Limits, json: bool) -> Self {
        let mut failures = Vec::new();
        let mut inputs = Vec::with_capacity(files.len());
        let mut file_index = Vec::with_capacity(files.len());

        for (index, path) in files.iter().enumerate() {
            match RawInput::from_path(path) {
                Ok(input) => {
                    for advisory in limits.file_advisory(&input) {
                        tracing::warn!(file = input.name(), kind = %advisory.kind(), "{}", advisory);
                        if !json {
                            Status::warning(&format!("{}: {}", input.name(), advisory.kind().full_message()));
                        }
                    }
                    inputs.push(input);
                    file_index.push(index);
                }
                Err(err) => failures.push((index, ConversionFailure::new(path.display().to_string(), &err))),
            }
        }

        let validation = validate_inputs(inputs);
        for (position, err) in &validation.invalid {
            let failure = ConversionFailure::new(err.file_name().unwrap_or("unknown"), err);
            failures.push((file_index[*position], failure));
        }

        Self {
            validation,
            file_index,
            failures,
        }
    }

    fn index_of(&self, item: &ValidatedInput) -> usize {
        self.file_index[item.position]
    }

    fn fail(&mut self, index: usize, failure: ConversionFailure) {
        self.failures.push((index, failure));
    }

    /// Every failure, in the order the files were given.
    fn failures_in_order(mut self) -> Vec<ConversionFailure> {
        self.failures.sort_by_key(|(index, _)| *index);
        self.failures.into_iter().map(|(_, failure)| failure).collect()
    }
}

async fn run_convert(args: ConvertArgs, mut config: Config, hidden: bool, json: bool) -> Result<i32> {
    if let Some(to) = args.to {
        config.schema.convert.output_format = to;
    }
    if let Some(quality) = args.quality {
        config.schema.convert.quality = f32::from(quality) / 100.0;
    }
    if let Some(target) = args.target_size {
        config.schema.optimize.target_bytes = target;
    }
    config.schema.optimize.lock_quality |= args.lock_quality;
    config.schema.optimize.lock_dimensions |= args.lock_dimensions;
    config.validate()?;
    let schema = &config.schema;

    let files = scan_inputs(args.paths, hidden)?;
    if let Some(advisory) = schema.limits.batch_advisory(files.len()) {
        tracing::warn!(files = files.len(), "Large batch");
        if !json {
            Status::warning(&advisory);
        }
    }

    let mut batch = Batch::load(&files, &schema.limits, json);
    let validation = std::mem::take(&mut batch.validation);

    let codec_options = &schema.codecs;
    let cache = Arc::new(CodecCache::with_timeout(
        DefaultCodecLoader::new(codec_options.clone()),
        Duration::from_secs(codec_options.load_timeout_secs),
    ));
    if codec_options.preload
        && validation.valid.iter().any(|item| item.descriptor.format == ImageFormat::Heic)
    {
        cache.init_preload(codec_options.network);
    }

    let mut converter = Converter::new(Codecs::new(cache), Optimizer::new(schema.optimize.settings.clone()));
    let options = schema.convert_options();

    let timer = Timer::start("convert_batch");
    let report = if validation.valid.is_empty() {
        BatchReport::default()
    } else {
        let valid = &validation.valid;
        let total = valid.len() as u64;
        let mut progress = if json {
            DeferredProgress::with_delay(total, SHOW_AFTER, false)
        } else {
            DeferredProgress::new(total)
        };

        let report = converter
            .convert_all(valid, &options, |event| match event.result {
                None => progress.start_file(valid[event.current - 1].input.name()),
                Some(_) => progress.finish_file(),
            })
            .await?;
        progress.finish();
        report
    };
    converter.reset();
    let elapsed = timer.stop();

    std::fs::create_dir_all(&args.out).map_err(|e| {
        Error::from(e).with_context(format!("Creating output directory {}", args.out.display()))
    })?;

    let mut taken = HashSet::new();
    let mut written: Vec<(&ConvertedFile, PathBuf)> = Vec::new();
    for (item, result) in validation.valid.iter().zip(report.results()) {
        let index = batch.index_of(item);
        let file = match result {
            Ok(file) => file,
            Err(failure) => {
                batch.fail(index, failure.clone());
                continue;
            }
        };

        let path = unique_path(&args.out, &file.file_name, &mut taken);
        match std::fs::write(&path, &file.data) {
            Ok(()) => written.push((file, path)),
            Err(e) => {
                let err = ConvertError::Unknown(format!("could not write {}: {}", path.display(), e));
                batch.fail(index, ConversionFailure::new(file.original_name.clone(), &err));
            }
        }
    }
    let failures = batch.failures_in_order();

    let total = files.len();
    let converted = written.len();
    let summary = batch_message(converted, total);

    if json {
        let converted_rows: Vec<_> = written
            .iter()
            .map(|(file, path)| json!({ "file": file, "path": path.display().to_string() }))
            .collect();
        let output = json!({
            "summary": summary,
            "total": total,
            "converted": converted_rows,
            "failed": failures,
            "elapsed_ms": elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for (file, path) in &written {
            Status::success(&format!(
                "{} → {} ({}, {}×{})",
                file.original_name,
                path.display(),
                format_file_size(file.byte_size),
                file.width,
                file.height
            ));
            if let Some(opt) = file.optimization.as_ref().filter(|opt| !opt.target_met) {
                Status::warning(&format!(
                    "{}: couldn't reach {}; kept the smallest result ({}) after {}",
                    file.original_name,
                    format_file_size(options.target_bytes),
                    format_file_size(file.byte_size),
                    format_count(opt.iterations as usize, "attempt", "attempts")
                ));
            }
        }
        for failure in &failures {
            Status::failure(&failure.file_name, failure.user_message(), failure.guidance());
        }

        let line = format!("{} ({})", summary, format_duration(elapsed));
        if converted == total {
            Status::success(&line);
        } else if converted > 0 {
            Status::warning(&line);
        } else {
            Status::error(&line);
        }
    }

    Ok(if converted == 0 {
        exit_codes::CONVERSION_FAILED
    } else {
        exit_codes::SUCCESS
    })
}

/// Output path for `name` in `dir`, adding " (n)" before the extension when
/// an earlier file in this run already took the name.
fn unique_path(dir: &Path, name: &str, taken: &mut HashSet<PathBuf>) -> PathBuf {
    let mut candidate = dir.join(name);
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = match ext {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        };
        n += 1;
    }

    taken.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use covert_core::ErrorCode;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_inputs_skips_unsupported_walked_files() {
        let photos = TempDir::new().unwrap();
        for name in ["IMG_1.heic", "IMG_2.JPG", "notes.txt", "Thumbs.db", ".hidden.png"] {
            fs::write(photos.path().join(name), b"x").unwrap();
        }
        let other = TempDir::new().unwrap();
        let named = other.path().join("scan.txt");
        fs::write(&named, b"x").unwrap();

        let files = scan_inputs(vec![photos.path().to_path_buf(), named.clone()], false).unwrap();
        assert_eq!(
            files,
            vec![photos.path().join("IMG_1.heic"), photos.path().join("IMG_2.JPG"), named]
        );

        let files = scan_inputs(vec![photos.path().to_path_buf()], true).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0], photos.path().join(".hidden.png"));
    }

    #[test]
    fn test_scan_inputs_without_images_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readme.md"), b"x").unwrap();
        let err = scan_inputs(vec![dir.path().to_path_buf()], false).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoInputs);
    }

    #[test]
    fn test_batch_failures_follow_input_order() {
        let dir = TempDir::new().unwrap();
        let write = |name: &str, bytes: &[u8]| {
            let path = dir.path().join(name);
            fs::write(&path, bytes).unwrap();
            path
        };
        let files = vec![
            write("notes.txt", b"hello"),
            dir.path().join("missing.heic"),
            write("photo.jpg", &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]),
            write("blob.bin", b"????"),
        ];

        let mut batch = Batch::load(&files, &Limits::default(), true);
        let validation = std::mem::take(&mut batch.validation);
        assert_eq!(validation.valid.len(), 1);

        let item = &validation.valid[0];
        let index = batch.index_of(item);
        assert_eq!(index, 2);
        let err = ConvertError::Unknown("disk full".into());
        batch.fail(index, ConversionFailure::new(item.input.name(), &err));

        let names: Vec<_> = batch
            .failures_in_order()
            .into_iter()
            .map(|failure| failure.file_name)
            .collect();
        assert_eq!(names.len(), 4);
        assert_eq!(names[0], "notes.txt");
        assert!(names[1].ends_with("missing.heic"));
        assert_eq!(names[2], "photo.jpg");
        assert_eq!(names[3], "blob.bin");
    }

    #[test]
    fn test_unique_path_dedupes_within_run() {
        let dir = Path::new("out");
        let mut taken = HashSet::new();
        assert_eq!(unique_path(dir, "a.jpg", &mut taken), dir.join("a.jpg"));
        assert_eq!(unique_path(dir, "a.jpg", &mut taken), dir.join("a (1).jpg"));
        assert_eq!(unique_path(dir, "a.jpg", &mut taken), dir.join("a (2).jpg"));
        assert_eq!(unique_path(dir, "b.jpg", &mut taken), dir.join("b.jpg"));
    }

    #[test]
    fn test_unique_path_without_extension() {
        let dir = Path::new("out");
        let mut taken = HashSet::new();
        unique_path(dir, ".jpg", &mut taken);
        assert_eq!(unique_path(dir, ".jpg", &mut taken), dir.join(".jpg (1)"));
    }

    #[test]
    fn test_cli_parses_convert() {
        let cli = Cli::try_parse_from([
            "covert",
            "convert",
            "a.heic",
            "photos",
            "--to",
            "png",
            "--quality",
            "80",
            "--target-size",
            "200KB",
            "--lock-dimensions",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.paths.len(), 2);
        assert_eq!(args.to, Some(OutputFormat::Png));
        assert_eq!(args.quality, Some(80));
        assert_eq!(args.target_size, Some(204_800));
        assert!(args.lock_dimensions);
        assert!(!args.lock_quality);
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        assert!(Cli::try_parse_from(["covert", "convert", "a.heic", "--quality", "0"]).is_err());
        assert!(Cli::try_parse_from(["covert", "convert", "a.heic", "--to", "gif"]).is_err());
        assert!(Cli::try_parse_from(["covert", "convert", "a.heic", "--target-size", "big"]).is_err());
        assert!(Cli::try_parse_from(["covert", "convert"]).is_err());
    }
}
