//! Configuration system
//!
//! Sections are declared with [`config_struct!`](crate::config_struct) in
//! `schemas`, loaded from TOML and overlaid with environment variables in
//! `utils`.

pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::*;
pub use utils::*;
