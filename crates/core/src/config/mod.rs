//! Configuration loading and schema definitions
//!
//! Settings come from `covert.toml`; command-line flags are applied on top by
//! the binary.

mod loader;
mod schema;

pub use loader::Config;
pub use schema::*;
