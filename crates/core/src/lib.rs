//! Host-side plumbing for the Covert image converter
//!
//! This crate provides what the command-line tool needs around the
//! conversion core:
//!
//! - **Error handling**: coded errors with context, recovery suggestions,
//!   and exit codes
//! - **Configuration**: `covert.toml` discovery, parsing, and validation
//! - **Input discovery**: files and directories expanded into an ordered
//!   file list
//!
//! # Example
//!
//! ```rust,no_run
//! use covert_core::{config::Config, inputs::InputScanner};
//!
//! let config = Config::load(None)?;
//! let files = InputScanner::new(["photos"]).scan()?;
//! println!("{} files, format {}", files.len(), config.schema.convert.output_format);
//! # Ok::<(), covert_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod inputs;

pub use error::{Error, ErrorCode, Result, ResultExt};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, ConfigSchema};
    pub use crate::error::{Error, ErrorCode, Result, ResultExt, exit_codes};
    pub use crate::inputs::InputScanner;
}
