//! Coded errors for the Covert host application
//!
//! Conversion failures inside a batch are data (`ConversionFailure`) and never
//! reach this type. `Error` covers what stops the tool itself: unreadable
//! paths, bad configuration, empty input sets, and a batch where nothing
//! converted.

use covert_image::{ConvertError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // General errors (1xxx)
    Unknown = 1000,
    Internal = 1001,
    Timeout = 1003,

    // IO errors (2xxx)
    IoError = 2000,
    FileNotFound = 2001,
    PermissionDenied = 2002,
    InvalidPath = 2003,
    DirectoryNotFound = 2004,

    // Configuration errors (3xxx)
    ConfigError = 3000,
    ConfigNotFound = 3001,
    ConfigParseError = 3002,
    ConfigValidationError = 3003,
    InvalidConfigValue = 3004,

    // Input errors (4xxx)
    NoInputs = 4000,
    UnsupportedFormat = 4001,
    DetectionFailed = 4002,
    FileTooLarge = 4003,
    MemoryExceeded = 4004,

    // Conversion errors (5xxx)
    ConversionFailed = 5000,
    DecodeFailed = 5001,
    EncodeFailed = 5002,
    NothingConverted = 5003,

    // Codec errors (6xxx)
    CodecError = 6000,
    CodecLoadFailed = 6001,
    CodecUnavailable = 6002,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a human-readable category
    pub fn category(&self) -> &'static str {
        match self.code() / 1000 {
            1 => "General",
            2 => "IO",
            3 => "Configuration",
            4 => "Input",
            5 => "Conversion",
            6 => "Codec",
            _ => "Unknown",
        }
    }

    /// Process exit code for an error in this category
    pub fn exit_code(&self) -> i32 {
        match self.code() / 1000 {
            3 => exit_codes::CONFIG_ERROR,
            4 => exit_codes::NO_INPUT,
            5 | 6 => exit_codes::CONVERSION_FAILED,
            _ if *self == ErrorCode::Timeout => exit_codes::TIMEOUT,
            _ => exit_codes::FAILURE,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::UnsupportedFormat => ErrorCode::UnsupportedFormat,
            ErrorKind::DetectionFailed => ErrorCode::DetectionFailed,
            ErrorKind::DecodeFailed => ErrorCode::DecodeFailed,
            ErrorKind::EncodeFailed => ErrorCode::EncodeFailed,
            ErrorKind::CodecLoadFailed => ErrorCode::CodecLoadFailed,
            ErrorKind::MemoryExceeded => ErrorCode::MemoryExceeded,
            ErrorKind::FileTooLarge => ErrorCode::FileTooLarge,
            ErrorKind::Unknown => ErrorCode::Unknown,
        }
    }
}

/// Main error type with rich context
#[derive(Error, Debug)]
pub struct Error {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional context
    pub context: Option<String>,
    /// Recovery suggestion
    pub suggestion: Option<String>,
    /// Source error
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, "\n  Context: {}", ctx)?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl Error {
    /// Create a new error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggestion: None,
            source: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a recovery suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    /// Convert to a serializable report
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code,
            code_str: self.code.to_string(),
            category: self.code.category().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
            suggestion: self.suggestion.clone(),
            source: self.source.as_ref().map(|e| e.to_string()),
        }
    }

    /// I/O failure
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IoError, message)
    }

    /// Missing input path
    pub fn file_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            ErrorCode::FileNotFound,
            format!("File not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Check that the file exists and you have read permissions")
    }

    /// Generic configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Explicit configuration path does not exist
    pub fn config_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Create a .covert.toml file or use --config to specify a path")
    }

    /// Configuration value out of range
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigValidationError, message)
            .with_suggestion("Fix the value in your covert.toml or remove it to use the default")
    }

    /// Nothing to work on
    pub fn no_inputs() -> Self {
        Self::new(ErrorCode::NoInputs, "No files to convert")
            .with_suggestion("Pass image files or directories containing images")
    }

    /// A batch finished without a single success
    pub fn nothing_converted(total: usize) -> Self {
        Self::new(
            ErrorCode::NothingConverted,
            covert_image::batch_message(0, total),
        )
    }
}

/// Serializable error report for logging and JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error code
    pub code: ErrorCode,
    /// Code as displayed ("E3003")
    pub code_str: String,
    /// Code category
    pub category: String,
    /// Message
    pub message: String,
    /// Additional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Recovery suggestion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Underlying cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes for CLI commands
pub mod exit_codes {
    /// Everything (or at least one file) succeeded
    pub const SUCCESS: i32 = 0;
    /// Unclassified failure
    pub const FAILURE: i32 = 1;
    /// Bad command-line usage
    pub const USAGE_ERROR: i32 = 2;
    /// Configuration could not be loaded or validated
    pub const CONFIG_ERROR: i32 = 3;
    /// No usable input files
    pub const NO_INPUT: i32 = 4;
    /// Nothing converted
    pub const CONVERSION_FAILED: i32 = 5;
    /// Operation timed out
    pub const TIMEOUT: i32 = 124;
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::IoError,
        };
        Error::new(code, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorCode::Internal, format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::new(ErrorCode::ConfigParseError, format!("TOML parse error: {}", err))
            .with_source(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.display().to_string());
        let mut error = Error::new(ErrorCode::IoError, err.to_string());
        if let Some(path) = path {
            error = error.with_context(format!("While scanning {}", path));
        }
        error.with_source(err)
    }
}

impl From<ConvertError> for Error {
    fn from(err: ConvertError) -> Self {
        let kind = err.kind();
        let code = match &err {
            ConvertError::NoCodec(_) => ErrorCode::CodecUnavailable,
            _ => kind.into(),
        };
        Error::new(code, err.to_string())
            .with_suggestion(kind.guidance())
            .with_source(err)
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Attach context to the error
    fn context(self, context: impl Into<String>) -> Result<T>;
    /// Attach a recovery suggestion to the error
    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_suggestion(suggestion))
    }
}
