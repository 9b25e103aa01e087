//! Terminal helpers for the Covert command-line tool
//!
//! Provides shared CLI functionality:
//! - Status lines and failure rendering
//! - Size and duration formatting, and `--target-size` parsing
//! - A batch progress bar that stays hidden for short runs

#![warn(missing_docs)]

pub mod output;
pub mod progress;
